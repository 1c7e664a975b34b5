pub mod envelope;
mod processor;

pub use envelope::{
    ChangeInfo, Command, Envelope, Push, PushReceiver, PushSender, Request, Response,
};
pub use processor::{CookieService, ServiceHandle};
