// lib.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Root level module that imports the feature modules.

pub mod title;
