//! launchpad-build — turns a build context into a pushed container image.
//!
//! The builder is a pure executor: it never chooses tags. [`TagPolicy`]
//! computes the next tag for an app and the caller hands it to
//! [`ImageBuilder::build`] and [`ImageBuilder::push`].

pub mod builder;
pub mod docker;
pub mod error;
pub mod tag;

pub use builder::ImageBuilder;
pub use docker::DockerBuilder;
pub use error::{BuildError, BuildResult};
pub use tag::TagPolicy;
