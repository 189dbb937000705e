mod arrays;
mod column_operations;
mod common;
mod cycle_detection;
mod dependency;
mod events;
mod iterative;
mod named_ranges;
mod range_dependencies;
mod row_operations;
mod transactions;
