// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod extraction_service;
pub mod landing_service;
pub mod load_service;
pub mod record_validator;
