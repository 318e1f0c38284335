//! Session commands: status, login, set-session, logout.

use std::error::Error;

use chrono::Utc;
use pacedream_api::Session;
use serde_json::json;

use crate::app::AppContext;

type CommandResult = Result<(), Box<dyn Error>>;

/// Print the current auth snapshot as JSON.
pub async fn status(ctx: &AppContext, verify: bool) -> CommandResult {
    let store = ctx.auth.client().token_store();
    let session = store.load()?;

    let state = if verify {
        ctx.auth.initialize().await?
    } else {
        store.auth_state()
    };
    let user_id = store.secrets().get_user_id()?;

    let snapshot = json!({
        "authenticated": state.is_authenticated(),
        "state": state,
        "has_session": session.is_some(),
        "expires_at": session.as_ref().and_then(Session::expires_at),
        "user_id": user_id,
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub async fn login(ctx: &AppContext, email: &str, password: &str) -> CommandResult {
    match ctx.auth.login_with_email_password(email, password).await? {
        Some(user) => println!("Signed in as {}", user.display_name()),
        None => println!("Signed in"),
    }
    Ok(())
}

pub fn set_session(
    ctx: &AppContext,
    access: String,
    refresh: String,
    expires_in: Option<i64>,
) -> CommandResult {
    let mut session =
        Session::new(access, refresh).ok_or("access and refresh tokens must not be empty")?;
    if let Some(seconds) = expires_in {
        session = session.with_expiry(Utc::now() + chrono::Duration::seconds(seconds));
    }

    ctx.auth.client().token_store().save(session)?;
    println!("Session stored");
    Ok(())
}

pub fn logout(ctx: &AppContext) -> CommandResult {
    ctx.auth.sign_out()?;
    println!("Signed out");
    Ok(())
}
