//! Shared test doubles.

pub mod fakes;
pub mod mock_cdp;
