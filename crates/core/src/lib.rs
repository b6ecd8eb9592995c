//! Sambox core: domain logic for the sampler and its effects pipeline.
//!
//! This crate contains everything that is independent of the audio backend:
//! the PCM stream model, the DSP effects (slewed low-pass, delay line,
//! compressor), the streaming dry/wet mixer with its ramp and attack-gate
//! state machines, the sample pad bank, and the persisted settings model.
//!
//! Device enumeration, stream construction, and file decoding live in
//! `sambox-infra`.

pub mod domain;
