//! # cord-store
//!
//! In-memory, versioned store of threads and messages for one viewer.
//!
//! Every change goes through [`reduce`], which takes the current
//! [`ThreadsState`] and an [`Action`] and returns the next version. The
//! state is built from persistent collections, so a reduction copies only
//! the thread it touches and older versions stay valid for readers that
//! still hold them.

pub mod actions;
pub mod filter;
pub mod lookup;
pub mod merge;
pub mod models;
pub mod reducer;
pub mod state;

pub use actions::{Action, MergeMessageOptions, MergeMode};
pub use filter::{thread_matches_filter, FilterSubject};
pub use merge::{merge_message, merge_thread};
pub use models::*;
pub use reducer::reduce;
pub use state::{ThreadsLocation, ThreadsState};
