//! Property-based tests for anchorpatch
//!
//! These check the invariants of an anchor patch over generated inputs: text
//! outside the anchored span never changes, misses never modify the file,
//! and patching is idempotent.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use anchorpatch::{
    AnchorPatch, AnchorPattern, BackupManager, FilePatcher, MissPolicy, MissReason, PatchOptions,
    PatchOutcome, PatchRecipe, PatchReport,
};

use proptest::prelude::*;

const START: &str = "<<BEGIN>>\n";
const END: &str = "\n<<END>>";

/// Text that can never contain either anchor (no '<')
fn body() -> impl Strategy<Value = String> {
    "[a-z0-9 {}:,\"\n]{0,60}"
}

fn patch(replacement: &str) -> AnchorPatch {
    AnchorPatch::new(AnchorPattern::new(START, END).unwrap(), replacement).unwrap()
}

fn write_target(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("target.ts");
    fs::write(&path, content).unwrap();
    path
}

fn demo_recipe() -> PatchRecipe {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/claude_schema.toml");
    PatchRecipe::load(&path).unwrap()
}

// ============================================================================
// Property 1: only the interior changes
// ============================================================================

proptest! {
    #[test]
    fn prop_outside_span_is_unchanged(
        prefix in body(),
        interior in body(),
        suffix in body(),
        replacement in body(),
    ) {
        let original = format!("{prefix}{START}{interior}{END}{suffix}");
        let outcome = patch(&replacement).apply(&original);

        if interior == replacement {
            prop_assert_eq!(outcome, PatchOutcome::AlreadyApplied);
        } else {
            let PatchOutcome::Patched { content, span } = outcome else {
                return Err(TestCaseError::fail("expected the patch to apply"));
            };
            prop_assert_eq!(&content, &format!("{prefix}{START}{replacement}{END}{suffix}"));
            prop_assert_eq!(&content[span.clone()], replacement.as_str());
            let head = format!("{prefix}{START}");
            let tail = format!("{END}{suffix}");
            prop_assert_eq!(&content[..span.start], head.as_str());
            prop_assert_eq!(&content[span.end..], tail.as_str());
        }
    }

    /// Only the first region is touched when the anchors repeat
    #[test]
    fn prop_later_regions_untouched(
        first in body(),
        second in body(),
        replacement in body(),
    ) {
        prop_assume!(first != replacement);
        let tail = format!("{START}{second}{END}");
        let original = format!("{START}{first}{END}{tail}");

        let PatchOutcome::Patched { content, .. } = patch(&replacement).apply(&original) else {
            return Err(TestCaseError::fail("expected the patch to apply"));
        };
        prop_assert!(content.ends_with(&tail));
    }
}

// ============================================================================
// Property 2: misses never change the file
// ============================================================================

proptest! {
    #[test]
    fn prop_checked_miss_is_byte_identical(text in body(), with_start in any::<bool>()) {
        // Optionally include the start anchor but never the end anchor
        let content = if with_start { format!("{START}{text}") } else { text };
        let dir = TempDir::new().unwrap();
        let path = write_target(&dir, &content);

        let report = FilePatcher::new(patch("NEW"), "prop")
            .run(&path, PatchOptions::default(), None)
            .unwrap();

        let PatchReport::NotMatched { reason, rewritten, .. } = report else {
            return Err(TestCaseError::fail("expected a miss"));
        };
        prop_assert!(!rewritten);
        let expected = if with_start {
            MissReason::EndAnchorMissing
        } else {
            MissReason::StartAnchorMissing
        };
        prop_assert_eq!(reason, expected);
        prop_assert_eq!(fs::read(&path).unwrap(), content.as_bytes());
    }

    /// The unchecked path rewrites the file, and the rewrite is a no-op
    #[test]
    fn prop_unchecked_miss_is_byte_identical(text in body()) {
        let dir = TempDir::new().unwrap();
        let path = write_target(&dir, &text);
        let options = PatchOptions {
            policy: MissPolicy::Unchecked,
            ..Default::default()
        };

        let report = FilePatcher::new(patch("NEW"), "prop").run(&path, options, None).unwrap();

        let rewritten = matches!(report, PatchReport::NotMatched { rewritten: true, .. });
        prop_assert!(rewritten);
        prop_assert_eq!(fs::read(&path).unwrap(), text.as_bytes());
    }
}

// ============================================================================
// Property 3: idempotence
// ============================================================================

proptest! {
    #[test]
    fn prop_patch_twice_equals_once(
        prefix in body(),
        interior in body(),
        suffix in body(),
        replacement in body(),
    ) {
        let original = format!("{prefix}{START}{interior}{END}{suffix}");
        let p = patch(&replacement);

        let once = match p.apply(&original) {
            PatchOutcome::Patched { content, .. } => content,
            PatchOutcome::AlreadyApplied => original.clone(),
            other => return Err(TestCaseError::fail(format!("unexpected {:?}", other))),
        };
        prop_assert_eq!(p.apply(&once), PatchOutcome::AlreadyApplied);
    }

    #[test]
    fn prop_file_patch_twice_writes_once(interior in body(), replacement in body()) {
        prop_assume!(interior != replacement);
        let dir = TempDir::new().unwrap();
        let path = write_target(&dir, &format!("x{START}{interior}{END}y"));
        let mut backups = BackupManager::with_directory(dir.path().join("backups")).unwrap();
        let patcher = FilePatcher::new(patch(&replacement), "prop");

        patcher.run(&path, PatchOptions::default(), Some(&mut backups)).unwrap();
        let once = fs::read_to_string(&path).unwrap();
        let report = patcher.run(&path, PatchOptions::default(), Some(&mut backups)).unwrap();

        prop_assert!(matches!(report, PatchReport::AlreadyApplied));
        prop_assert_eq!(fs::read_to_string(&path).unwrap(), once);
        // The second run must not take a backup either
        prop_assert_eq!(backups.list_backups().unwrap().len(), 1);
    }
}

proptest! {
    /// A guard text absent from the replacement does not block the no-op rerun
    #[test]
    fn prop_guarded_patch_twice_equals_once(
        interior in body(),
        replacement in body(),
    ) {
        prop_assume!(!replacement.contains("GUARD"));
        let guarded = patch(&replacement).with_required_interior(Some("GUARD".into()));
        let original = format!("{START}GUARD{interior}{END}");

        let PatchOutcome::Patched { content, .. } = guarded.apply(&original) else {
            return Err(TestCaseError::fail("expected the patch to apply"));
        };
        prop_assert_eq!(guarded.apply(&content), PatchOutcome::AlreadyApplied);
    }

    /// Replacements ending in part of a self-overlapping end anchor are refused
    #[test]
    fn prop_overlapping_end_anchor_is_idempotent(
        interior in "[a-z\n]{0,20}",
        replacement in "[a-z\n]{0,20}",
    ) {
        let pattern = AnchorPattern::new("BEGIN\n", "\n\n").unwrap();
        let Ok(p) = AnchorPatch::new(pattern, replacement.as_str()) else {
            prop_assert!(replacement.contains("\n\n") || replacement.ends_with('\n'));
            return Ok(());
        };
        let original = format!("BEGIN\n{interior}\n\nrest");
        let once = match p.apply(&original) {
            PatchOutcome::Patched { content, .. } => content,
            PatchOutcome::AlreadyApplied => original.clone(),
            PatchOutcome::NotMatched { .. } => return Ok(()),
        };
        prop_assert_eq!(p.apply(&once), PatchOutcome::AlreadyApplied);
    }
}

// ============================================================================
// Backups and dry run
// ============================================================================

proptest! {
    #[test]
    fn prop_rollback_restores_original(interior in body(), replacement in body()) {
        prop_assume!(interior != replacement);
        let dir = TempDir::new().unwrap();
        let original = format!("head{START}{interior}{END}tail");
        let path = write_target(&dir, &original);
        let mut backups = BackupManager::with_directory(dir.path().join("backups")).unwrap();

        let report = FilePatcher::new(patch(&replacement), "prop")
            .run(&path, PatchOptions::default(), Some(&mut backups))
            .unwrap();
        let PatchReport::Applied { backup_id: Some(id), .. } = report else {
            return Err(TestCaseError::fail("expected an applied patch with a backup"));
        };

        backups.restore_backup(&id).unwrap();
        prop_assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn prop_dry_run_matches_execute(interior in body(), replacement in body()) {
        prop_assume!(interior != replacement);
        let dir = TempDir::new().unwrap();
        let original = format!("{START}{interior}{END}");
        let path = write_target(&dir, &original);
        let patcher = FilePatcher::new(patch(&replacement), "prop");

        let dry = PatchOptions { dry_run: true, ..Default::default() };
        let PatchReport::Preview { patched: preview, .. } = patcher.run(&path, dry, None).unwrap() else {
            return Err(TestCaseError::fail("expected a preview"));
        };
        prop_assert_eq!(fs::read_to_string(&path).unwrap(), original);

        patcher.run(&path, PatchOptions::default(), None).unwrap();
        prop_assert_eq!(fs::read_to_string(&path).unwrap(), preview);
    }
}

// ============================================================================
// Concrete cases
// ============================================================================

#[test]
fn test_demo_recipe_rewrites_schema() {
    let resolved = demo_recipe().resolve(500).unwrap();
    let original = "Please provide your analysis in the following JSON format:\n{\n\"paydexBannerPrompt\": \"old text\"\n}\n\nRemember: be concise";

    let PatchOutcome::Patched { content, span } = resolved.patch.apply(original) else {
        panic!("expected the demo recipe to apply");
    };

    let schema_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/claude_schema.json");
    let schema = fs::read_to_string(schema_path).unwrap();
    assert_eq!(&content[span.clone()], schema.trim_end());
    assert!(content[span.clone()].starts_with('{'));

    for key in [
        "xBannerPrompt",
        "logoPrompt",
        "heroBackgroundPrompt",
        "featureIconPrompts",
        "communityScenePrompt",
        "websiteContent",
    ] {
        assert!(content[span.clone()].contains(key), "missing {}", key);
    }

    assert!(content.starts_with("Please provide your analysis in the following JSON format:\n{"));
    assert!(content.ends_with("}\n\nRemember: be concise"));
}

#[test]
fn test_demo_recipe_requires_paydex_key() {
    let resolved = demo_recipe().resolve(500).unwrap();
    let original = "Please provide your analysis in the following JSON format:\n{\n\"other\": 1\n}\n\nRemember: x";

    let PatchOutcome::NotMatched { reason, snippet } = resolved.patch.apply(original) else {
        panic!("expected a miss");
    };
    assert_eq!(reason, MissReason::InteriorGuardMissing);
    assert!(snippet.unwrap().text.starts_with("Please provide your analysis"));
}

#[test]
fn test_first_end_anchor_wins_inside_quoted_string() {
    let start = "JSON format:\n";
    let end = "}\n\nRemember:";
    let p = AnchorPatch::new(AnchorPattern::new(start, end).unwrap(), "{ \"new\": 1 ").unwrap();

    let original = "JSON format:\n{ \"note\": \"}\n\nRemember: this is quoted\" }\n\nRemember: real";
    let PatchOutcome::Patched { content, .. } = p.apply(original) else {
        panic!("expected the patch to apply");
    };

    // The match stops at the quoted occurrence; everything after it is untouched.
    assert_eq!(
        content,
        "JSON format:\n{ \"new\": 1 }\n\nRemember: this is quoted\" }\n\nRemember: real"
    );
}

#[test]
fn test_snippet_limited_to_configured_chars() {
    let p = patch("NEW").with_marker("MARK").with_snippet_chars(500);
    let original = format!("xx MARK{}", "a".repeat(2000));

    let PatchOutcome::NotMatched { snippet: Some(snippet), .. } = p.apply(&original) else {
        panic!("expected a miss with a snippet");
    };
    assert_eq!(snippet.offset, 3);
    assert_eq!(snippet.text.chars().count(), 500);
    assert!(snippet.text.starts_with("MARK"));
}
