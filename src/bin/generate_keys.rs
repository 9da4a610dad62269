//! Generate the RSA key pair used for client-side credential encryption
//!
//! Usage: generate-keys [--bits N] [--out DIR]
//!
//! Writes `private.pem` (PKCS#8) and `public.pem` (SPKI) into DIR
//! (default `keys`). Point `auth.private_key_path` at the private key.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use jobboard::services::credentials::{CredentialDecryptor, DEFAULT_KEY_BITS};

const MIN_BITS: usize = 1024;

struct Args {
    bits: usize,
    out: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        bits: DEFAULT_KEY_BITS,
        out: PathBuf::from("keys"),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--bits" => {
                let value = iter.next().context("--bits needs a value")?;
                args.bits = value
                    .parse()
                    .with_context(|| format!("Invalid key size: {}", value))?;
            }
            "--out" => {
                args.out = PathBuf::from(iter.next().context("--out needs a directory")?);
            }
            "-h" | "--help" => {
                println!("Usage: generate-keys [--bits N] [--out DIR]");
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    if args.bits < MIN_BITS {
        bail!("Key size must be at least {} bits", MIN_BITS);
    }
    Ok(args)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "generate_keys=info,jobboard=info".into()),
        )
        .init();

    let args = parse_args()?;

    tracing::info!("Generating {}-bit RSA key pair...", args.bits);
    let keys = CredentialDecryptor::generate(args.bits)?;

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;

    let private_path = args.out.join("private.pem");
    let public_path = args.out.join("public.pem");

    std::fs::write(&private_path, keys.private_key_pem()?)
        .with_context(|| format!("Failed to write {}", private_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&private_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict {}", private_path.display()))?;
    }

    std::fs::write(&public_path, keys.public_key_pem())
        .with_context(|| format!("Failed to write {}", public_path.display()))?;

    tracing::info!("Private key: {}", private_path.display());
    tracing::info!("Public key:  {}", public_path.display());
    Ok(())
}
