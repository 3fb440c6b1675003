use std::fmt;

use clap::Args;

/// Print build information
#[derive(Args, Debug, Clone)]
pub struct Version;

/// Build metadata captured by `build.rs`
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub package_version: &'static str,
    pub repo_version: &'static str,
    pub build_profile: &'static str,
    pub build_timestamp: &'static str,
    pub build_target: &'static str,
    pub rust_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            package_version: env!("CARGO_PKG_VERSION"),
            repo_version: env!("REPO_VERSION"),
            build_profile: env!("BUILD_PROFILE"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
            build_target: env!("BUILD_TARGET"),
            rust_version: env!("RUST_VERSION"),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "modseal {} ({})\n\
             - Profile: {}\n\
             - Built: {}\n\
             - Target: {}\n\
             - Compiler: {}",
            self.package_version,
            self.repo_version,
            self.build_profile,
            self.build_timestamp,
            self.build_target,
            self.rust_version
        )
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(BuildInfo::current().to_string())
    }
}
