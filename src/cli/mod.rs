//! Command-line front end
//!
//! Thin commands over [`crate::Api`]: each parses its arguments, performs one
//! platform operation and prints the JSON result to stdout.
//!
//! ```bash
//! assetlink read Task --filter '[["name","is","Foo"]]' --fields id,name
//! assetlink poll 5f1c0a
//! assetlink upload ./shot010.mov project/seq/shot010/shot010.mov
//! ```

pub mod commands;
