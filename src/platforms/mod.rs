// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Observability platforms.
//!
//! A platform is described by data, not code: each descriptor is a YAML or
//! JSON document exposing the capability set checked by [`YamlPlatform`].
//! Four descriptors are embedded; more are discovered in
//! `~/.agent-instrumentor/platforms` and any configured plugin directory.

mod descriptor;
mod registry;

pub use descriptor::{EnvVarSpec, PlatformDescriptor, PlatformInfo, YamlPlatform};
pub use registry::{PlatformRegistry, PlatformRegistryBuilder, RegistryDiagnostic};
