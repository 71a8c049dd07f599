pub mod crawl;
pub mod monitor;
pub mod search;
pub mod serve;
pub mod status;
pub mod worker;
