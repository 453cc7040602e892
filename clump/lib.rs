#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod alleles;
pub mod columns;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod ingest;
pub mod io;
pub mod links;
pub mod locus;
pub mod rank;
pub mod types;
