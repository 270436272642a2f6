//! keygen — generate a Soulprint node identity file.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use soulprint_crypto::NodeKeypair;

#[derive(Parser, Debug)]
#[command(name = "keygen", version, about = "Generate a Soulprint node identity")]
struct Args {
    /// Where to write the identity file.
    #[arg(long, default_value = "node-identity.json")]
    out: PathBuf,

    /// Overwrite an existing file.
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.out.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            args.out.display()
        );
    }

    let keypair = NodeKeypair::generate();
    keypair
        .save(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;

    println!("did: {}", keypair.did);
    println!("written: {}", args.out.display());
    Ok(())
}
