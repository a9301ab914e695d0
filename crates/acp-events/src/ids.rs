//! Identifier minting. Every entity id is `<prefix>_<uuid-simple>`.

use uuid::Uuid;

pub const EVENT: &str = "evt";
pub const AGENT: &str = "agt";
pub const CORRELATION: &str = "cor";
pub const MESSAGE: &str = "msg";
pub const ARTIFACT: &str = "art";
pub const RUN: &str = "run";
pub const STEP: &str = "stp";
pub const ROOM: &str = "rm";
pub const THREAD: &str = "thr";
pub const LESSON: &str = "les";
pub const APPROVAL: &str = "apr";
pub const SCORECARD: &str = "sc";
pub const PRINCIPAL: &str = "prn";
pub const CONSTRAINT: &str = "cst";
pub const SKILL_PACKAGE: &str = "skp";

pub fn mint(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_carry_prefix_and_are_unique() {
        let a = mint(RUN);
        let b = mint(RUN);
        assert!(a.starts_with("run_"));
        assert_ne!(a, b);
    }
}
