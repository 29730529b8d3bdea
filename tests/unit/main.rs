//! Unit tests for the DragonBot controller core.


mod command_encoder_test;
mod drill_engine_test;
