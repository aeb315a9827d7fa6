//! Property tests for resolution, lineage and preset invariants.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{harness, MockLlmProvider};
use prompt_forge::facets::FacetSnapshot;
use prompt_forge::lineage::{
    DocumentLineagePersistence, LegacyEntry, LegacyTimestamp, MigrationOutcome, PromptLineageStore,
};
use prompt_forge::preset::PresetStore;
use prompt_forge::storage::MemoryDocumentStore;
use prompt_forge::template::TemplatePatch;
use proptest::prelude::*;
use serde_json::{json, Value};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

fn lineage_store() -> (Arc<MemoryDocumentStore>, PromptLineageStore) {
    let backing = Arc::new(MemoryDocumentStore::new());
    let store = PromptLineageStore::new(Arc::new(DocumentLineagePersistence::new(backing.clone())));
    (backing, store)
}

#[derive(Debug, Clone)]
enum LineageOp {
    Original(String),
    /// Enhance the n-th original recorded so far, or an unknown id when out of range.
    Enhanced(usize, String),
}

fn lineage_op_strategy() -> impl Strategy<Value = LineageOp> {
    prop_oneof![
        "[a-z ]{1,16}".prop_map(LineageOp::Original),
        (0usize..6, "[a-z ]{1,16}").prop_map(|(n, text)| LineageOp::Enhanced(n, text)),
    ]
}

fn legacy_strategy() -> impl Strategy<Value = Vec<LegacyEntry>> {
    prop::collection::vec(
        (
            "[a-z ]{1,12}",
            prop::option::of("[a-z ]{0,12}"),
            any::<bool>(),
            0i64..2_000_000_000_000,
        ),
        1..8,
    )
    .prop_map(|records| {
        records
            .into_iter()
            .enumerate()
            .map(|(index, (prompt, enhanced, with_id, millis))| LegacyEntry {
                id: with_id.then(|| format!("legacy-{}", index)),
                timestamp: Some(LegacyTimestamp::Millis(millis)),
                prompt,
                enhanced_prompt: enhanced,
                options: json!({ "index": index }),
                template_used: None,
                is_selected: false,
            })
            .collect()
    })
}

fn presets_strategy() -> impl Strategy<Value = Vec<(String, Option<String>, bool, String)>> {
    prop::collection::vec(
        (
            "[A-Za-z][A-Za-z ]{0,10}",
            prop::option::of("[a-z ]{1,12}"),
            any::<bool>(),
            "[a-z]{1,8}",
        ),
        0..6,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_resolve_never_empty(
        template_id in "[A-Za-z0-9_./ -]{0,20}",
        override_text in prop::option::of("[ a-z]{0,12}"),
        blank_working_copy in any::<bool>(),
    ) {
        let rt = runtime();
        let h = harness(MockLlmProvider::new("unused"));
        if blank_working_copy {
            let _ = h.studio.update_template(&template_id, &TemplatePatch::new().with_master_prompt(""));
        }

        let resolved = rt.block_on(h.studio.resolve_template(&template_id, override_text.as_deref()));

        prop_assert!(!resolved.instructions().trim().is_empty());
        let tag = serde_json::to_value(resolved.source).expect("serialize");
        prop_assert!(matches!(
            tag.as_str(),
            Some("explicit") | Some("database") | Some("memory") | Some("builtin")
        ));
    }

    #[test]
    fn test_no_orphans_persisted(ops in prop::collection::vec(lineage_op_strategy(), 1..20)) {
        let rt = runtime();
        let (backing, store) = lineage_store();

        rt.block_on(async {
            let mut originals = Vec::new();
            for op in &ops {
                match op {
                    LineageOp::Original(prompt) => {
                        let entry = store.add_original(prompt, FacetSnapshot::new(), "standard").await;
                        originals.push(entry.id);
                    }
                    LineageOp::Enhanced(n, text) => {
                        let parent = originals.get(*n).cloned().unwrap_or_else(|| "missing".to_string());
                        store.add_enhanced(&parent, text, "standard").await;
                    }
                }
            }
        });

        let reloaded = PromptLineageStore::new(Arc::new(DocumentLineagePersistence::new(backing)));
        let entries = rt.block_on(reloaded.get_all());
        let original_ids: HashSet<&str> = entries
            .iter()
            .filter(|e| e.is_original())
            .map(|e| e.id.as_str())
            .collect();

        for entry in entries.iter().filter(|e| e.is_enhanced()) {
            let parent = entry.parent_id.as_deref().unwrap_or_default();
            prop_assert!(original_ids.contains(parent));
        }
        prop_assert_eq!(entries, rt.block_on(store.get_all()));
    }

    #[test]
    fn test_toggle_isolation(
        count in 1usize..8,
        toggles in prop::collection::vec((0usize..8, prop::option::of(any::<bool>())), 1..12),
    ) {
        let rt = runtime();
        let (_backing, store) = lineage_store();

        rt.block_on(async {
            for i in 0..count {
                store.add_original(&format!("prompt {}", i), FacetSnapshot::new(), "standard").await;
            }

            for (index, explicit) in toggles {
                let before = store.get_all().await;
                let target = &before[index % before.len()];

                store.toggle_selection(&target.id, explicit).await.expect("known entry");
                let after = store.get_all().await;

                for (old, new) in before.iter().zip(after.iter()) {
                    if old.id == target.id {
                        let expected = explicit.unwrap_or(!old.is_selected);
                        assert_eq!(new.is_selected, expected);
                    } else {
                        assert_eq!(old, new);
                    }
                }
            }
        });
    }

    #[test]
    fn test_migration_idempotent(legacy in legacy_strategy()) {
        let rt = runtime();
        let (_backing_once, once) = lineage_store();
        let (_backing_twice, twice) = lineage_store();

        rt.block_on(async {
            once.migrate_entries(&legacy).await.expect("migrate");

            twice.migrate_entries(&legacy).await.expect("migrate");
            let second = twice.migrate_entries(&legacy).await.expect("migrate again");
            assert!(matches!(second, MigrationOutcome::Skipped { .. }));

            assert_eq!(once.get_all().await, twice.get_all().await);
        });
    }

    #[test]
    fn test_preset_export_import_round_trip(presets in presets_strategy()) {
        let rt = runtime();
        let source = PresetStore::new(Arc::new(MemoryDocumentStore::new()));
        let target = PresetStore::new(Arc::new(MemoryDocumentStore::new()));

        rt.block_on(async {
            for (name, description, favorite, facet) in &presets {
                source
                    .save(name, description.as_deref(), FacetSnapshot::new().with("style", facet.as_str()), *favorite)
                    .await
                    .expect("save");
            }

            let exported = source.export_all().await;
            assert!(target.import_all(&exported).await);
            assert_eq!(target.list().await, source.list().await);
        });
    }

    #[test]
    fn test_invalid_import_leaves_store_unchanged(name in "[A-Za-z]{1,8}", bad_index in 0usize..3) {
        let rt = runtime();
        let store = PresetStore::new(Arc::new(MemoryDocumentStore::new()));

        let invalid: Vec<Value> = vec![
            json!({"version": 1, "presets": [{"id": "a", "name": ""}]}),
            json!({"version": 99, "presets": []}),
            json!([{"id": "a", "name": "A"}, {"id": "a", "name": "B"}]),
        ];

        rt.block_on(async {
            store.save(&name, None, FacetSnapshot::new(), false).await.expect("save");
            let before = store.list().await;

            assert!(!store.import_all(&invalid[bad_index]).await);
            assert_eq!(store.list().await, before);
        });
    }
}
