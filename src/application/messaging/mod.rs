//! Message handling - middleware chains and dispatch of inbound updates

pub mod middleware;
pub mod pipeline;

pub use middleware::{Context, Handler, HandlerResult, Middleware, MiddlewareChain};
pub use pipeline::{Outcome, Pipeline};
