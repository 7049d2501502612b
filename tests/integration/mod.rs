// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod extractor_test;
pub mod helpers;
pub mod pipeline_scenarios_test;
pub mod raw_loader_test;
