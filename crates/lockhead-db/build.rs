//! Build script for the embedded migrations.
//!
//! `sqlx::migrate!` reads `migrations/` at compile time, so changes there
//! must trigger a rebuild.

fn main() {
    println!("cargo:rerun-if-changed=migrations/");
}
