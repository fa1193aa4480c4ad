//! # Seed Set
//!
//! The fixed data a fresh graph starts with: a website project, three tasks,
//! three people, property value concepts, name labels, four relation types
//! and the relation instances binding them.
//!
//! All seed documents belong to the genesis owner and are therefore
//! readable by everyone under the default capability policy.

use crate::store::EntityStore;
use crate::types::{
    Classification, EntityId, GraphError, Kind, Payload, RelationBinding, Role, UserId,
};

/// Concepts without content.
const CONCEPTS: &[&str] = &[
    "@project1",
    "@task1",
    "@task2",
    "@task3",
    "@person1",
    "@person2",
    "@person3",
    "@prop_status",
    "@prop_skill",
    "@prop_priority",
    "@prop_tag",
    "@prop_purpose",
    "@prop_leader",
    "@prop_deadline",
    "@means_tasks",
    "@means_work",
];

/// Text concepts: `(id, text, display name)`.
const TEXTS: &[(&str, &str, Option<&str>)] = &[
    ("@status_inprogress", "in-progress", None),
    ("@status_notstarted", "not-started", None),
    ("@status_completed", "completed", None),
    ("@skill_design", "design", None),
    ("@skill_dev", "development", None),
    ("@skill_test", "testing", None),
    ("@priority_high", "high", None),
    ("@priority_medium", "medium", None),
    ("@priority_none", "none", None),
    ("@tag_frontend", "frontend", None),
    ("@tag_qa", "qa", None),
    ("@purpose_build_website", "Build website", None),
    ("@deadline_2024_12_31", "2024-12-31", None),
    ("@method_agile", "Agile methodology", None),
    ("@method_waterfall", "Waterfall methodology", None),
    ("@method_kanban", "Kanban system", None),
    ("@method_scrum", "Scrum framework", None),
    ("@project1_name", "Project: Website", Some("Project 1 Name")),
    ("@task1_name", "Task 1", Some("Task 1 Name")),
    ("@task2_name", "Task 2", Some("Task 2 Name")),
    ("@task3_name", "Task 3", Some("Task 3 Name")),
    ("@person1_name", "Alice", Some("Person 1 Name")),
    ("@person2_name", "Bob", Some("Person 2 Name")),
    ("@person3_name", "Charlie", Some("Person 3 Name")),
];

/// Relation types with their role descriptions.
const RELATION_TYPES: &[(&str, &[(Role, &str)])] = &[
    (
        "@zukte",
        &[
            (Role::X1, "volitional entity (agent/person/organization)"),
            (Role::X2, "means/action (method/process)"),
            (Role::X3, "purpose/goal (objective/desired outcome)"),
        ],
    ),
    (
        "@gunka",
        &[
            (Role::X1, "worker (person/agent who performs the task)"),
            (Role::X2, "activity/task (specific work item being performed)"),
            (Role::X3, "goal/objective (project or higher-level purpose)"),
        ],
    ),
    (
        "@ckaji",
        &[
            (Role::X1, "entity (object/concept being characterized)"),
            (Role::X2, "property/characteristic (value concept or attribute)"),
        ],
    ),
    ("@prenu", &[(Role::X1, "person (human individual)")]),
];

/// Relation instances other than properties: `(id, relation type, bindings)`.
const RELATIONS: &[(&str, &str, &[(Role, &str)])] = &[
    (
        "@bridi_zukte_person1_agile",
        "@zukte",
        &[
            (Role::X1, "@person1"),
            (Role::X2, "@method_agile"),
            (Role::X3, "@purpose_build_website"),
        ],
    ),
    (
        "@bridi_gunka_task1",
        "@gunka",
        &[(Role::X1, "@person2"), (Role::X2, "@task1"), (Role::X3, "@project1")],
    ),
    (
        "@bridi_gunka_task2",
        "@gunka",
        &[(Role::X1, "@person1"), (Role::X2, "@task2"), (Role::X3, "@project1")],
    ),
    (
        "@bridi_gunka_task3",
        "@gunka",
        &[(Role::X1, "@person3"), (Role::X2, "@task3"), (Role::X3, "@project1")],
    ),
];

/// Property instances of `@ckaji`: `(id, entity, property value)`.
const PROPERTIES: &[(&str, &str, &str)] = &[
    ("@bridi_proj1_ckaji_purpose", "@project1", "@purpose_build_website"),
    ("@bridi_proj1_ckaji_leader", "@project1", "@person1"),
    ("@bridi_proj1_ckaji_deadline", "@project1", "@deadline_2024_12_31"),
    ("@bridi_task1_ckaji_skill", "@task1", "@skill_design"),
    ("@bridi_task1_ckaji_status", "@task1", "@status_inprogress"),
    ("@bridi_task1_ckaji_priority", "@task1", "@priority_high"),
    ("@bridi_task1_ckaji_tag", "@task1", "@tag_frontend"),
    ("@bridi_task2_ckaji_skill", "@task2", "@skill_dev"),
    ("@bridi_task2_ckaji_status", "@task2", "@status_notstarted"),
    ("@bridi_task2_ckaji_priority", "@task2", "@priority_medium"),
    ("@bridi_task3_ckaji_skill", "@task3", "@skill_test"),
    ("@bridi_task3_ckaji_status", "@task3", "@status_notstarted"),
    ("@bridi_task3_ckaji_tag", "@task3", "@tag_qa"),
    ("@bridi_person1_ckaji_name", "@person1", "@person1_name"),
    ("@bridi_person2_ckaji_name", "@person2", "@person2_name"),
    ("@bridi_person3_ckaji_name", "@person3", "@person3_name"),
    ("@bridi_proj1_ckaji_name", "@project1", "@project1_name"),
    ("@bridi_task1_ckaji_name", "@task1", "@task1_name"),
    ("@bridi_task2_ckaji_name", "@task2", "@task2_name"),
    ("@bridi_task3_ckaji_name", "@task3", "@task3_name"),
];

/// Stateless namespace for the seed data.
pub struct SeedSet;

impl SeedSet {
    /// Number of entities the seed creates.
    #[must_use]
    pub fn len() -> usize {
        CONCEPTS.len() + TEXTS.len() + RELATION_TYPES.len() + RELATIONS.len() + PROPERTIES.len()
    }

    /// Write every seed entity into `store`. Returns the ids written.
    ///
    /// Does not index and does not commit.
    pub fn load(store: &mut EntityStore, owner: &UserId) -> Result<Vec<EntityId>, GraphError> {
        let mut written = Vec::with_capacity(Self::len());
        let mut put = |id: &str, classification: Classification, payload: Payload| {
            let id = EntityId::from(id);
            store.put(id.clone(), &classification, &payload, owner.clone())?;
            written.push(id);
            Ok::<(), GraphError>(())
        };

        for id in CONCEPTS {
            put(*id, Classification::new(Kind::Concept), Payload::Concept)?;
        }
        for (id, text, display_name) in TEXTS {
            let mut classification = Classification::new(Kind::Concept);
            if let Some(name) = display_name {
                classification = classification.with_display_name(*name);
            }
            put(*id, classification, Payload::Text((*text).to_string()))?;
        }
        for (id, roles) in RELATION_TYPES {
            put(
                *id,
                Classification::new(Kind::RelationType),
                Payload::role_descriptions(roles.iter().copied()),
            )?;
        }
        for (id, relation_type, roles) in RELATIONS {
            let binding = roles
                .iter()
                .fold(RelationBinding::new(*relation_type), |binding, (role, bound)| {
                    binding.bind(*role, *bound)
                });
            put(*id, Classification::new(Kind::Relation), Payload::binding(&binding))?;
        }
        for (id, entity, value) in PROPERTIES {
            let binding = RelationBinding::new("@ckaji")
                .bind(Role::X1, *entity)
                .bind(Role::X2, *value);
            put(*id, Classification::new(Kind::Relation), Payload::binding(&binding))?;
        }

        tracing::debug!(entities = written.len(), "seed set loaded");
        Ok(written)
    }
}

// =============================================================================
// TESTS
// =============================================================================
