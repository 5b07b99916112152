//! Wisdom: the portable text form of retained planning decisions.
//!
//! Format (stable bit-for-bit within a version):
//!
//! ```text
//! (spectraforge-X.Y.Z spectraforge_wisdom
//!   (name id #xFLAGS #xS0 #xS1 #xS2 #xS3)
//!   ...)
//! ```
//!
//! `name` is a bare token, `id` a decimal integer, the rest hexadecimal
//! words. Whitespace between tokens is arbitrary. Import is all-or-nothing:
//! any syntax error rejects the whole stream and leaves the cache as it
//! was; a record naming a solver this registry does not have is silently
//! skipped for forward/backward compatibility.

use crate::cache::{Slot, SolutionCache};
use crate::fingerprint::Signature;
use crate::flags::SearchFlags;
use crate::registry::SolverRegistry;
use anyhow::{anyhow, bail, ensure, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

const PREAMBLE: &str = concat!("spectraforge-", env!("CARGO_PKG_VERSION"));
const WISDOM_TAG: &str = "spectraforge_wisdom";

/// Serialize every retained, feasible cache entry.
pub fn export(cache: &mut SolutionCache, registry: &SolverRegistry) -> String {
    // Fold retention markers of shadowed duplicates into their dominating
    // entries first, so nothing worth keeping is skipped.
    cache.consolidate_retention();

    let mut out = String::new();
    let _ = writeln!(out, "({PREAMBLE} {WISDOM_TAG}");
    for (sig, flags, ndx) in cache.retained() {
        let Some(desc) = registry.desc(ndx as usize) else {
            continue;
        };
        let w = sig.words();
        let _ = writeln!(
            out,
            "  ({} {} #x{:x} #x{:08x} #x{:08x} #x{:08x} #x{:08x})",
            desc.name(),
            desc.id(),
            flags.wire(),
            w[0],
            w[1],
            w[2],
            w[3],
        );
    }
    out.push_str(")\n");
    out
}

/// Parse `text` and merge its records into the cache; returns the number
/// accepted. The parse completes before the first insert, so a malformed
/// stream cannot leave the cache half-updated.
pub fn import(cache: &mut SolutionCache, registry: &SolverRegistry, text: &str) -> Result<usize> {
    let records = parse(text)?;

    let mut accepted = 0;
    for rec in records {
        match registry.find_by_name_id(&rec.name, rec.id) {
            Some(ndx) => {
                cache.insert(
                    Signature(rec.sig),
                    SearchFlags::from_wire(rec.flags),
                    Slot::Solver(ndx as u32),
                );
                accepted += 1;
            }
            None => {
                debug!(name = %rec.name, id = rec.id, "skipping wisdom for unknown solver");
            }
        }
    }
    Ok(accepted)
}

pub fn export_to_file(
    cache: &mut SolutionCache,
    registry: &SolverRegistry,
    path: &Path,
) -> Result<()> {
    fs::write(path, export(cache, registry))?;
    Ok(())
}

pub fn import_from_file(
    cache: &mut SolutionCache,
    registry: &SolverRegistry,
    path: &Path,
) -> Result<usize> {
    let text = fs::read_to_string(path)?;
    import(cache, registry, &text)
}

struct Record {
    name: String,
    id: u32,
    flags: u16,
    sig: [u32; 4],
}

fn parse(text: &str) -> Result<Vec<Record>> {
    let mut toks = Tokens::new(text);
    toks.expect_open()?;

    let package = toks.word()?;
    ensure!(
        package == PREAMBLE,
        "unrecognized wisdom preamble {package:?}"
    );
    let tag = toks.word()?;
    ensure!(tag == WISDOM_TAG, "unrecognized wisdom tag {tag:?}");

    let mut records = Vec::new();
    loop {
        match toks.next_token()? {
            Token::Close => break,
            Token::Open => {
                let name = toks.word()?;
                let id_word = toks.word()?;
                let id = id_word
                    .parse::<u32>()
                    .map_err(|_| anyhow!("malformed solver id {id_word:?}"))?;
                let flags_word = hex_word(&toks.word()?)?;
                ensure!(
                    flags_word <= u16::MAX as u32,
                    "flags word out of range: {flags_word:#x}"
                );
                let mut sig = [0u32; 4];
                for word in &mut sig {
                    *word = hex_word(&toks.word()?)?;
                }
                toks.expect_close()?;
                records.push(Record {
                    name,
                    id,
                    flags: flags_word as u16,
                    sig,
                });
            }
            Token::Word(w) => bail!("unexpected token {w:?} in wisdom stream"),
        }
    }
    Ok(records)
}

fn hex_word(word: &str) -> Result<u32> {
    let hex = word
        .strip_prefix("#x")
        .ok_or_else(|| anyhow!("expected #x-prefixed hex word, got {word:?}"))?;
    ensure!(!hex.is_empty(), "empty hex word");
    u32::from_str_radix(hex, 16).map_err(|_| anyhow!("malformed hex word {word:?}"))
}

#[derive(Debug)]
enum Token {
    Open,
    Close,
    Word(String),
}

struct Tokens<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Tokens<'a> {
        Tokens {
            chars: text.chars().peekable(),
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
        match self.chars.next() {
            None => bail!("unexpected end of wisdom stream"),
            Some('(') => Ok(Token::Open),
            Some(')') => Ok(Token::Close),
            Some(first) => {
                let mut word = String::new();
                word.push(first);
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    word.push(c);
                    self.chars.next();
                }
                Ok(Token::Word(word))
            }
        }
    }

    fn word(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Word(w) => Ok(w),
            t => bail!("expected a token, got {t:?}"),
        }
    }

    fn expect_open(&mut self) -> Result<()> {
        match self.next_token()? {
            Token::Open => Ok(()),
            t => bail!("expected '(', got {t:?}"),
        }
    }

    fn expect_close(&mut self) -> Result<()> {
        match self.next_token()? {
            Token::Close => Ok(()),
            t => bail!("expected ')', got {t:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Patience;
    use crate::plan::Plan;
    use crate::planner::Planner;
    use crate::problem::TransformProblem;
    use crate::registry::Solver;

    struct NullSolver;

    impl Solver for NullSolver {
        fn try_build(
            &self,
            _problem: &TransformProblem,
            _planner: &mut Planner<'_>,
        ) -> Option<Plan> {
            None
        }
    }

    fn sig(seed: u64) -> Signature {
        let mut fp = crate::fingerprint::Fingerprinter::new();
        fp.add_u64(seed);
        fp.finish()
    }

    fn registry() -> SolverRegistry {
        let mut reg = SolverRegistry::new();
        reg.register("direct", NullSolver);
        reg.register("ct", NullSolver);
        reg.register("ct", NullSolver);
        reg
    }

    fn blessed(flags: SearchFlags) -> SearchFlags {
        flags | SearchFlags::BLESSING
    }

    #[test]
    fn export_import_round_trip() {
        let reg = registry();
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags().remove(SearchFlags::NO_SLOW);
        cache.insert(sig(1), blessed(f), Slot::Solver(0));
        cache.insert(sig(2), blessed(f), Slot::Solver(2));
        // Unblessed entries must not be exported.
        cache.insert(sig(3), f, Slot::Solver(1));
        // Neither must negative entries.
        cache.insert(sig(4), blessed(f), Slot::Infeasible);

        let text = export(&mut cache, &reg);

        let mut fresh = SolutionCache::new();
        let accepted = import(&mut fresh, &reg, &text).expect("import");
        assert_eq!(accepted, 2);
        assert_eq!(
            fresh.lookup(&sig(1), f).map(|e| e.slot),
            Some(Slot::Solver(0))
        );
        assert_eq!(
            fresh.lookup(&sig(2), f).map(|e| e.slot),
            Some(Slot::Solver(2))
        );
        assert!(fresh.lookup(&sig(3), f).is_none());
        assert!(fresh.lookup(&sig(4), f).is_none());
    }

    #[test]
    fn round_trip_survives_registry_renumbering() {
        let reg = registry();
        let mut cache = SolutionCache::new();
        let f = Patience::Thorough.search_flags().remove(SearchFlags::NO_SLOW);
        // "ct" id 1 is index 2 here.
        cache.insert(sig(10), blessed(f), Slot::Solver(2));
        let text = export(&mut cache, &reg);

        // A registry with the same names registered in a different overall
        // order: "ct" id 1 now lives at index 1.
        let mut other = SolverRegistry::new();
        other.register("ct", NullSolver);
        other.register("ct", NullSolver);
        other.register("direct", NullSolver);

        let mut fresh = SolutionCache::new();
        assert_eq!(import(&mut fresh, &other, &text).expect("import"), 1);
        assert_eq!(
            fresh.lookup(&sig(10), f).map(|e| e.slot),
            Some(Slot::Solver(1))
        );
    }

    #[test]
    fn imported_entries_survive_forgetting() {
        let reg = registry();
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags().remove(SearchFlags::NO_SLOW);
        cache.insert(sig(5), blessed(f), Slot::Solver(1));
        let text = export(&mut cache, &reg);

        let mut fresh = SolutionCache::new();
        import(&mut fresh, &reg, &text).expect("import");
        fresh.forget(crate::flags::Amnesia::NonRetained);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn unknown_solver_records_are_skipped() {
        let reg = registry();
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags().remove(SearchFlags::NO_SLOW);
        cache.insert(sig(6), blessed(f), Slot::Solver(0));
        let text = export(&mut cache, &reg);

        // A registry missing "direct" entirely.
        let mut other = SolverRegistry::new();
        other.register("ct", NullSolver);

        let mut fresh = SolutionCache::new();
        assert_eq!(import(&mut fresh, &other, &text).expect("import"), 0);
        assert!(fresh.is_empty());
    }

    #[test]
    fn malformed_input_is_rejected_atomically() {
        let reg = registry();
        let mut cache = SolutionCache::new();
        let f = Patience::Measure.search_flags();
        cache.insert(sig(7), f, Slot::Solver(1));
        let before = cache.entries();

        let bad = format!(
            "({PREAMBLE} {WISDOM_TAG}\n  (direct 0 #xZZ #x0 #x0 #x0 #x0)\n)\n"
        );
        assert!(import(&mut cache, &reg, &bad).is_err());
        assert_eq!(cache.entries(), before, "cache must be untouched");

        let truncated = format!("({PREAMBLE} {WISDOM_TAG}\n  (direct 0 #x8");
        assert!(import(&mut cache, &reg, &truncated).is_err());
        assert_eq!(cache.entries(), before);

        assert!(import(&mut cache, &reg, "(other-library wisdom)").is_err());
        assert_eq!(cache.entries(), before);
    }

    #[test]
    fn whitespace_between_tokens_is_arbitrary() {
        let reg = registry();
        let w = sig(8).words();
        let flags = Patience::Measure.search_flags().remove(SearchFlags::NO_SLOW);
        let squeezed = format!(
            "({PREAMBLE} {WISDOM_TAG}(direct 0 #x{:x}\n\t #x{:x} #x{:x}  #x{:x}\n#x{:x}))",
            blessed(flags).wire(),
            w[0],
            w[1],
            w[2],
            w[3],
        );
        let mut cache = SolutionCache::new();
        assert_eq!(import(&mut cache, &reg, &squeezed).expect("import"), 1);
        assert_eq!(
            cache.lookup(&sig(8), flags).map(|e| e.slot),
            Some(Slot::Solver(0))
        );
    }
}
