//! The Proc Library
//!
//! The stages the compiler assembles into a query graph. Every proc wraps
//! its parent and implements the pull contract from [`crate::proc`].

pub mod agg;
pub mod cut;
pub mod filter;
pub mod groupby;
pub mod head;
pub mod pass;
pub mod sort;
pub mod tail;
pub mod top;
pub mod uniq;

pub use agg::AggProc;
pub use cut::CutProc;
pub use filter::FilterProc;
pub use groupby::GroupByProc;
pub use head::HeadProc;
pub use pass::PassProc;
pub use sort::SortProc;
pub use tail::TailProc;
pub use top::TopProc;
pub use uniq::UniqProc;
