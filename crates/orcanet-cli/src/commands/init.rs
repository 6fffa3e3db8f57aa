//! `orcanet init`: write a default node configuration.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory).
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Seed for the node identity.
    #[arg(long)]
    pub seed: Option<String>,

    /// Relay multiaddress, ending in /p2p/<peer id>.
    #[arg(long)]
    pub relay: Option<String>,
}

pub fn render_config(args: &InitArgs) -> String {
    let seed = match &args.seed {
        Some(seed) => format!("seed = {:?}", seed),
        None => "# seed = \"choose-a-secret\"".to_string(),
    };
    let relay = match &args.relay {
        Some(relay) => format!("relay_addr = {:?}", relay),
        None => "# relay_addr = \"/ip4/1.2.3.4/tcp/4001/p2p/<relay peer id>\"".to_string(),
    };
    format!(
        r#"# OrcaNet Node Configuration

[identity]
{seed}

[network]
listen_addr = "0.0.0.0"
port = 60000
{relay}
bootstrap_peers = []
dht_mode = "client"
reservation_refresh_secs = 600
reservation_timeout_secs = 30
require_reservation = true

[transfer]
reply_timeout_secs = 60
files_dir = "files"

[api]
listen_addr = "0.0.0.0"
port = 8080

[storage]
data_dir = "./data"

[wallet]
payment_url = "http://localhost:18080/wallet/send"

[proxy]
location = ""
ip_address = ""
port = 8081

[logging]
level = "info"
format = "text"
"#
    )
}

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    let config_path = args.dir.join("orcanet.toml");

    if config_path.exists() {
        anyhow::bail!("configuration file already exists at {}", config_path.display());
    }

    std::fs::create_dir_all(&args.dir)?;
    std::fs::write(&config_path, render_config(args))?;
    println!("Initialized OrcaNet node at {}", config_path.display());
    println!("Edit orcanet.toml to customize your configuration.");
    println!("Run 'orcanet-node' to start the node.");

    std::fs::create_dir_all(args.dir.join("data"))?;
    std::fs::create_dir_all(args.dir.join("files"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_with_seed() {
        let args = InitArgs {
            dir: PathBuf::from("."),
            seed: Some("alice".into()),
            relay: None,
        };
        let rendered = render_config(&args);
        assert!(rendered.contains("seed = \"alice\""));
        assert!(rendered.contains("# relay_addr"));
        assert!(rendered.contains("port = 60000"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!("orcanet-cli-init-{}", std::process::id()));
        let args = InitArgs {
            dir: dir.clone(),
            seed: None,
            relay: None,
        };
        run(&args).unwrap();
        assert!(dir.join("orcanet.toml").exists());
        assert!(run(&args).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
