// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Samples per-service cgroup v1 CPU and memory accounting files and forwards them
//! as Graphite plaintext lines over a single shared TCP connection.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod descriptor;
pub mod errors;
pub mod escape;
pub mod sampler;
pub mod sink;
pub mod supervisor;
