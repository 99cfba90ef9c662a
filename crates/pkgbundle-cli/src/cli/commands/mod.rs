pub mod digest;
pub mod keygen;
pub mod sign;
pub mod states;
pub mod verify;

use super::args::{Cli, Command};
use crate::exit_codes;

pub async fn dispatch(cli: Cli) -> i32 {
    match cli.cmd {
        Command::Keygen(args) => keygen::cmd_keygen(args),
        Command::Sign(args) => sign::cmd_sign(args),
        Command::Verify(args) => verify::cmd_verify(args),
        Command::Digest(args) => digest::cmd_digest(args),
        Command::States(args) => states::cmd_states(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            exit_codes::SUCCESS
        }
    }
}
