mod analytics;

pub use analytics::record_request;
