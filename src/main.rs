use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::info;

use gensandbox::{GeneratorSpec, LibraryBundle, RenderOptions, TokenData};

#[derive(Debug, Parser)]
#[command(name = "gensandbox", about = "Render untrusted generator scripts in a headless browser")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print the body text the generator produces for a token
    Eval(Common),
    /// Write a PNG of the generator's output for a token
    Screenshot {
        #[command(flatten)]
        common: Common,
        /// Where to write the image
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Debug, Args)]
struct Common {
    /// Generator spec JSON: {"script": ..., "library": ..., "aspectRatio": ...}
    #[arg(long)]
    generator: PathBuf,
    /// Token data JSON injected as `tokenData`
    #[arg(long)]
    token: PathBuf,
    /// Directory holding vendored library builds (p5.min.js, ...)
    #[arg(long)]
    lib_dir: Option<PathBuf>,
    /// Browser executable
    #[arg(long, default_value = gensandbox::DEFAULT_BINARY)]
    browser: PathBuf,
    /// Kill the browser after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Common {
    fn load(&self) -> Result<(GeneratorSpec, TokenData, LibraryBundle, RenderOptions)> {
        let raw = std::fs::read_to_string(&self.generator)
            .with_context(|| format!("reading {}", self.generator.display()))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.generator.display()))?;
        let spec = GeneratorSpec::from_json(&value)?;

        let raw = std::fs::read_to_string(&self.token)
            .with_context(|| format!("reading {}", self.token.display()))?;
        let token = TokenData(
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", self.token.display()))?,
        );

        let bundle = match &self.lib_dir {
            Some(dir) => LibraryBundle::from_dir(dir)?,
            None => LibraryBundle::new(),
        };

        let options = RenderOptions {
            binary_path: self.browser.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
            ..Default::default()
        };
        Ok((spec, token, bundle, options))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().filter_or("RUST_LOG", "warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Eval(common) => {
            let (spec, token, bundle, options) = common.load()?;
            let text = gensandbox::render_features(&spec, &token, &bundle, &options)?;
            println!("{}", text);
        }
        Cmd::Screenshot { common, out } => {
            let (spec, token, bundle, options) = common.load()?;
            gensandbox::render_image(&spec, &token, &bundle, &out, &options)?;
            info!("wrote {}", out.display());
        }
    }
    Ok(())
}
