//! Cross-crate integration tests for the sampler pipeline.

#[cfg(test)]
mod mixer_integration;
