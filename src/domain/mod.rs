pub mod day_block;
pub mod forecast;
pub mod history;
pub mod observation;

pub use day_block::*;
pub use forecast::*;
pub use history::*;
pub use observation::*;
