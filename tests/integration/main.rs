//! Integration tests for poly-engine

mod execution_test;
mod pipeline_test;
mod risk_test;
mod state_test;
