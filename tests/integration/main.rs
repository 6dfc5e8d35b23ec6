//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises the network subsystem
//! against mock adapters.  All tests run on the host with no real hardware
//! or network required.

mod mock_net;
mod server_tests;
