use rushia_tracker::{CookieApi, clear_cookie};

use crate::cli::{CookieClearArgs, CookieUploadArgs};
use crate::client::{AppContext, CliResult};
use crate::output::{render_cookie_uploaded, render_notice};

pub(crate) async fn handle_cookie_upload(ctx: &AppContext, args: CookieUploadArgs) -> CliResult<()> {
    let cookie_id = ctx.client.upload_cookie(&args.file).await?;
    render_cookie_uploaded(&cookie_id, ctx.output)
}

/// Deletion failures are logged and ignored.
pub(crate) async fn handle_cookie_clear(ctx: &AppContext, args: CookieClearArgs) -> CliResult<()> {
    clear_cookie(&ctx.client, &args.cookie_id).await;
    render_notice("Cookie cleared.", ctx.output)
}
