//! Dump recovery: recover (or clean up) keys named explicitly in a dump
//! file, rather than discovered by iterating a node (spec.md §4.7
//! "DumpTask & DumpGroupProcessor").

mod group;
mod task;

pub use group::{process_dump_across_groups, process_dump_file, DumpRecord};
pub use task::run_dump_task;
