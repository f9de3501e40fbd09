use clap::Parser;

use pasteclean::cli::{self, Cli, Command, ConfigCommand};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Clean(args) => cli::handle_clean(config_path, &args),

        Command::Config(sub) => {
            match sub {
                ConfigCommand::Show => cli::handle_config_show(config_path)?,
                ConfigCommand::Path => cli::handle_config_path(config_path),
                ConfigCommand::Schema => cli::handle_config_schema()?,
            }
            Ok(())
        }

        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    }
}
