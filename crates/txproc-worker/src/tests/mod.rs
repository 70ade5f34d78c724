//! Test suites for the worker bootstrap and event loop.

mod dispatch_behaviour;
mod support;
mod unit;
