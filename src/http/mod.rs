//! HTTP dispatch and outcome classification for the JWNET API.

mod classify;
mod dispatcher;

pub use classify::{
    classify_elapsed, classify_malformed, classify_status, classify_transport, classify_unread_body,
};
pub use dispatcher::{API_KEY_HEADER, Dispatcher, PUBLIC_CONFIRM_NO_HEADER, SUBSCRIBER_NO_HEADER};
