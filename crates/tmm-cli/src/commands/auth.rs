use crate::cli::AuthCommands;
use crate::error::CliError;

use super::common::{format_timestamp, resolve_password, AppContext};

pub async fn run(ctx: &AppContext, command: AuthCommands) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { username, password } => {
            let password = resolve_password(password)?;
            let outcome = ctx.auth.login(&username, &password).await?;
            if !outcome.success {
                return Err(CliError::AuthFailed(outcome.message));
            }
            if let Some(user) = outcome.user {
                println!("{} as {} ({})", outcome.message, user.username, user.display_name);
            }
            Ok(())
        }
        AuthCommands::Register {
            username,
            name,
            password,
        } => {
            let password = resolve_password(password)?;
            let display_name = name.unwrap_or_default();
            let outcome = ctx
                .auth
                .register(&username, &password, &display_name)
                .await?;
            if !outcome.success {
                return Err(CliError::AuthFailed(outcome.message));
            }
            if let Some(user) = outcome.user {
                println!("{} for {} ({})", outcome.message, user.username, user.display_name);
            }
            Ok(())
        }
        AuthCommands::Status { verify } => {
            let Some(user) = ctx.auth.restore().await? else {
                println!("Not signed in");
                return Ok(());
            };
            println!("Signed in as {} ({})", user.username, user.display_name);
            println!("Server: {}", ctx.config.api_base_url);
            println!("Last sync: {}", format_timestamp(user.last_sync));

            if verify {
                if ctx.auth.verify().await? {
                    println!("Token: valid");
                } else {
                    return Err(CliError::AuthFailed(
                        "Session expired, sign in again".to_string(),
                    ));
                }
            }
            Ok(())
        }
        AuthCommands::Logout => {
            ctx.auth.logout().await?;
            println!("Signed out; local data removed");
            Ok(())
        }
    }
}
