//! # PairIP patcher
//!
//! Removes PairIP license and integrity checks from Android split-package
//! bundles by structurally editing the decoded package: smali method bodies
//! are replaced or short-circuited, manifest components are dropped and
//! replacement native libraries are copied next to the protected core.
//!
//! The building blocks are generic. A [`rules::ContentRule`] is a pure
//! rewrite of one file's text, implemented by [`rewriter::MethodRewriter`],
//! [`inserter::MethodInserter`] and the XML rules in [`xml`]. The
//! [`pipeline::Pipeline`] drives the external tools through the
//! [`toolchain::Toolchain`] trait and applies the PairIP profile in [`pairip`].
//!
//! # Examples
//!
//! ```
//!  use pairip_patcher::inserter::MethodInserter;
//!  use pairip_patcher::rules::{ContentRule, PatchOutcome};
//!
//!  let smali = ".method public static check()V\n    .registers 1\n    nop\n.end method\n";
//!  let guard = MethodInserter::return_void("check()V".parse().unwrap());
//!  let patched = guard.apply(smali).unwrap();
//!  assert_eq!(patched.outcome(), PatchOutcome::Changed(1));
//!  assert_eq!(guard.apply(&patched.content).unwrap().outcome(), PatchOutcome::Unchanged);
//! ```

pub mod android;
pub mod config;
pub mod deployer;
pub mod error;
pub mod inserter;
pub mod locator;
pub mod pairip;
pub mod pipeline;
pub mod region;
pub mod report;
pub mod rewriter;
pub mod rules;
mod smali_parse;
#[cfg(test)]
mod tests;
pub mod toolchain;
pub mod types;
pub mod xml;
