use anyhow::{Context, Result};
use certrender::{CertificateData, Renderer, RendererConfig};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "certrender", version, about = "Render certificates to PDF, JPEG or PNG")]
struct Cli {
    /// JSON configuration file (missing keys keep their defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a certificate file
    Render {
        /// Recipient JSON file, or `-` for stdin
        #[arg(long)]
        data: String,
        /// Background template (http(s) URL, data: URL or local path)
        #[arg(long)]
        template: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Pdf)]
        format: Format,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print a PNG preview as a data URL
    Preview {
        #[arg(long)]
        data: String,
        #[arg(long)]
        template: Option<String>,
    },
    /// Serve the HTTP handler
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Pdf,
    Jpeg,
    Png,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn read_data(source: &str) -> Result<CertificateData> {
    let mut raw = Vec::new();
    if source == "-" {
        std::io::stdin().read_to_end(&mut raw).context("reading recipient data from stdin")?;
    } else {
        raw = std::fs::read(Path::new(source)).with_context(|| format!("reading {}", source))?;
    }
    CertificateData::from_json(&raw).context("parsing recipient data")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => RendererConfig::from_json_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => RendererConfig::default(),
    };
    let renderer = Renderer::new(config)?;

    match cli.command {
        Command::Render {
            data,
            template,
            format,
            output,
        } => {
            let data = read_data(&data)?;
            let bytes = match format {
                Format::Png => renderer.generate_preview_png(&data, template.as_deref())?,
                #[cfg(feature = "cdp")]
                Format::Pdf => renderer.render_certificate(&data, template.as_deref(), certrender::OutputFormat::Pdf)?,
                #[cfg(feature = "cdp")]
                Format::Jpeg => renderer.render_certificate(&data, template.as_deref(), certrender::OutputFormat::Jpeg)?,
                #[cfg(not(feature = "cdp"))]
                Format::Pdf | Format::Jpeg => anyhow::bail!("PDF/JPEG output requires the `cdp` feature"),
            };
            std::fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote {} ({} bytes)", output.display(), bytes.len());
        }
        Command::Preview { data, template } => {
            let data = read_data(&data)?;
            println!("{}", renderer.generate_preview_data_url(&data, template.as_deref())?);
        }
        Command::Serve { addr } => serve(&addr, renderer)?,
    }
    Ok(())
}

#[cfg(all(feature = "server", feature = "cdp"))]
fn serve(addr: &str, renderer: Renderer) -> Result<()> {
    Ok(certrender::server::serve(addr, renderer)?)
}

#[cfg(not(all(feature = "server", feature = "cdp")))]
fn serve(_addr: &str, _renderer: Renderer) -> Result<()> {
    anyhow::bail!("`serve` requires the `server` and `cdp` features")
}
