mod http_transport;

pub use http_transport::{build_responses_url, sanitize_upstream_error, HttpTransport};
