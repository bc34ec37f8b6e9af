#![allow(dead_code)]

use std::sync::Arc;

use runme_engine::ParseOptions;
use runme_engine::identity::{FixedIdGenerator, Lifecycle};

pub const FIXED_ID: &str = "01HFB6Z3N6Y8Q4B2T7G9KJ3M5V";

pub fn options(lifecycle: Lifecycle) -> ParseOptions {
    ParseOptions::default()
        .with_lifecycle(lifecycle)
        .with_generator(Arc::new(FixedIdGenerator::new(FIXED_ID)))
        .with_ast_metadata(false)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("{}/tests/fixtures/{name}.md", env!("CARGO_MANIFEST_DIR"))).unwrap()
}
