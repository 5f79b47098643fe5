//! Driver-specific [`PageHandle`](crate::page::PageHandle) implementations.

pub mod chromiumoxide;
