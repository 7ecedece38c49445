//! UniFFI bindings crate for the mailmirror library
//!
//! This crate wraps the mailmirror crate for UniFFI library mode binding generation.
//! It re-exports the FFI module and UniFFI scaffolding from the mailmirror crate.
//!
//! ## Building for Swift
//!
//! 1. Build the library for Apple platforms:
//!    ```bash
//!    cargo build --release -p mailmirror-ffi --target aarch64-apple-darwin
//!    cargo build --release -p mailmirror-ffi --target aarch64-apple-ios
//!    ```
//!
//! 2. Generate Swift bindings:
//!    ```bash
//!    cargo run -p mailmirror-ffi --features bindgen --bin uniffi-bindgen generate \
//!        --library target/aarch64-apple-darwin/release/libmailmirror_ffi.dylib \
//!        --language swift \
//!        --out-dir generated/swift
//!    ```

// Re-export everything from the mailmirror crate's FFI module
pub use mailmirror::ffi::*;

// Needed for library mode binding generation
mailmirror::uniffi_reexport_scaffolding!();
