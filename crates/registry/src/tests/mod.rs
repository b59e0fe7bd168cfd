//! Cross-module property and scenario tests for the registry core.


mod strategy;
