// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod cancel;
pub mod collaborators;
pub mod graph;
pub mod orchestrator;
pub mod quality_gate;
pub mod scheduler;
pub mod summary;
