mod scan;
pub mod stats;


pub use scan::ScanPipeline;
pub use stats::ScanStats;
