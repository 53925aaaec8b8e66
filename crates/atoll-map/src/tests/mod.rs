//! Tests for the atoll-map crate.

mod helpers;

mod lifecycle;
