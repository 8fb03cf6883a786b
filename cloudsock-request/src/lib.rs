#![deny(unsafe_code)]

mod arg;
mod bus;
mod coerce;
mod dispatch;
mod errors;
mod handler;
mod syntax;

pub use arg::Arg;
pub use bus::{DispatchEvent, DispatchEventBus, DispatchEventKind};
pub use coerce::CoerceKind;
pub use dispatch::{RequestHandler, RetryFn};
pub use errors::RequestError;
pub use handler::{HandlerFn, Registration};
pub use syntax::{parse_subrequest, split_subrequests, ParsedRequest};
