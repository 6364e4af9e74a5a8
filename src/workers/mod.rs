pub mod discovery;
pub mod dispatcher;
pub mod pool;
pub mod transcoder;
