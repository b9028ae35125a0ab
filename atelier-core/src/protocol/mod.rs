//! Protocol module for generation request/response structures
//!
//! This module defines the provider-agnostic data model exchanged between the
//! job queue and the provider adapters. These structures are designed to be:
//! - Provider-agnostic
//! - Immutable once built
//! - Type-safe and serializable

pub mod types;

pub use types::{
    Asset, AssetKind, Assets, Credentials, Dimensions, EncodedPayload, ErrorKind,
    GeneratedOutput, GenerationFailure, GenerationRequest, GenerationResponse, GenerationStatus,
    ImageParameters, JobParameters, ModelVariant, ParseDimensionsError, Quality,
    ResponseModality, UsageRecordRef, VideoParameters,
};
