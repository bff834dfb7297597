/*!

Provides utilities for testing the bundle runtime against a real cluster using `kind` and
`docker`. Tests that use it are gated behind the `integ` feature.

!*/

pub mod cluster;
mod test_settings;

pub use cluster::Cluster;
