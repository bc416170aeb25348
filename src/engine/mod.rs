pub mod dispatch;
pub mod ingest;
pub mod lifecycle;
pub mod lock;
pub mod pricing;
pub mod shutdown;
