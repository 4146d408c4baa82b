//! Request dispatch.
//!
//! Walks the module registry in registration order and invokes the first
//! applicable handler. Module order is the only precedence signal between
//! modules: operators register specific modules before catch-alls. A
//! handler fault terminates dispatch for that request; it is never retried
//! against later modules and never reaches the accept loop.

use std::sync::Arc;

use tracing::{debug, error};

use hearth_protocol::pages;
use hearth_protocol::HttpContext;

use crate::module::Module;
use crate::server::ServerCore;

/// Status a handler sets deliberately before failing; it is preserved
/// instead of being overwritten by the 500 document.
const UNAUTHORIZED: u16 = 401;

/// Dispatch one request. On return the context always carries a complete
/// response: the handler's, the fixed 500 document, or the fixed 404
/// document.
pub async fn dispatch(core: &ServerCore, ctx: &mut HttpContext) {
    debug!(
        "[{}] {} {} from {}",
        ctx.token, ctx.request.verb, ctx.request.path, ctx.peer
    );

    // Snapshot the registry so no lock is held across handler awaits.
    let modules: Vec<Arc<dyn Module>> = core.registry().read().modules().to_vec();

    for module in modules {
        let Some(handler) = module.handlers().resolve(&ctx.request.path, ctx.request.verb)
        else {
            continue;
        };

        match handler(core, ctx).await {
            Ok(true) => {
                debug!("[{}] Handled by {}", ctx.token, module.name());
                ctx.handled = true;
                return;
            }
            Ok(false) => continue,
            Err(fault) => {
                error!(
                    "[{}] Handler fault in {}: {}",
                    ctx.token,
                    module.name(),
                    fault.message
                );
                if ctx.response.status() != UNAUTHORIZED {
                    let body = pages::error_page(
                        module.name(),
                        &fault.message,
                        &fault.backtrace.to_string(),
                    );
                    ctx.response.set_status(500);
                    ctx.response
                        .set_header("Content-Type", "text/html; charset=utf-8");
                    ctx.response.set_body(body.into_bytes());
                }
                ctx.handled = true;
                return;
            }
        }
    }

    debug!("[{}] No module handled the request", ctx.token);
    ctx.response.set_status(404);
    ctx.response
        .set_header("Content-Type", "text/html; charset=utf-8");
    ctx.response
        .set_body(pages::NOT_FOUND_PAGE.as_bytes().to_vec());
    ctx.handled = true;
}
