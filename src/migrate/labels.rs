//! Team labels, plus linking each card's legacy label names to them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::migrate::{ExistenceScope, Migration, Named, Owner};
use crate::model::{Label, Team};
use crate::report::ParentOutcome;
use crate::store::db::Db;
use crate::templates::LabelTemplate;

impl Named for Team {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Owner for Team {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Named for Label {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for LabelTemplate {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct LabelMigration {
    templates: Vec<LabelTemplate>,
}

impl LabelMigration {
    pub const NAME: &'static str = "labels";

    pub fn new(templates: Vec<LabelTemplate>) -> Self {
        Self { templates }
    }
}

impl Migration for LabelMigration {
    type Parent = Team;
    type Template = LabelTemplate;
    type Child = Label;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn scope(&self) -> ExistenceScope {
        ExistenceScope::Name
    }

    fn has_already_migrated(&self, db: &Db) -> Result<bool> {
        db.any_card_label()
    }

    fn build_templates(&self, _now: DateTime<Utc>) -> Vec<LabelTemplate> {
        self.templates.clone()
    }

    fn list_parents(&self, db: &Db) -> Result<Vec<Team>> {
        db.list_teams()
    }

    fn count_children(&self, db: &Db, team: &Team) -> Result<u64> {
        db.count_labels(&team.id)
    }

    fn create_child(
        &self,
        db: &Db,
        team: &Team,
        template: &LabelTemplate,
        _order: u32,
    ) -> Result<Label> {
        db.create_label(&team.id, &template.name, &template.color)
    }

    fn find_child(&self, db: &Db, team: &Team, template: &LabelTemplate) -> Result<Option<Label>> {
        db.find_label(&team.id, &template.name)
    }

    /// Link every card in the team's projects to the labels named in its
    /// legacy column. Names with no matching label are reported as unmatched.
    fn after_parent(&self, db: &Db, team: &Team, outcome: &mut ParentOutcome) -> Result<()> {
        let labels = db.labels_for_team(&team.id)?;
        let by_name: HashMap<&str, &Label> = labels
            .iter()
            .map(|label| (label.name.as_str(), label))
            .collect();

        for card in db.cards_for_team(&team.id)? {
            let names: Vec<String> = match serde_json::from_str(&card.legacy_labels) {
                Ok(names) => names,
                Err(err) => {
                    outcome.fail(
                        format!("card {}", card.id),
                        format!("unreadable legacy labels: {err}"),
                    );
                    continue;
                }
            };

            for name in &names {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let Some(label) = by_name.get(name) else {
                    if !outcome.unmatched.iter().any(|n| n == name) {
                        outcome.unmatched.push(name.to_string());
                    }
                    continue;
                };
                match db.link_card_label(&card.id, &label.id) {
                    Ok(true) => outcome.links_created += 1,
                    Ok(false) => {}
                    Err(err) => outcome.fail(format!("card {}", card.id), err.to_string()),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::migrate::{ParentApply, apply_to_parent, run_migration};
    use crate::report::ParentStatus;
    use crate::templates::default_labels;

    fn migration() -> LabelMigration {
        LabelMigration::new(default_labels())
    }

    /// Fails one template with a non-duplicate error.
    struct FailingLabels {
        inner: LabelMigration,
        fail_on: &'static str,
    }

    impl Migration for FailingLabels {
        type Parent = Team;
        type Template = LabelTemplate;
        type Child = Label;

        fn name(&self) -> &'static str {
            self.inner.name()
        }
        fn scope(&self) -> ExistenceScope {
            self.inner.scope()
        }
        fn has_already_migrated(&self, db: &Db) -> Result<bool> {
            self.inner.has_already_migrated(db)
        }
        fn build_templates(&self, now: DateTime<Utc>) -> Vec<LabelTemplate> {
            self.inner.build_templates(now)
        }
        fn list_parents(&self, db: &Db) -> Result<Vec<Team>> {
            self.inner.list_parents(db)
        }
        fn count_children(&self, db: &Db, team: &Team) -> Result<u64> {
            self.inner.count_children(db, team)
        }
        fn create_child(
            &self,
            db: &Db,
            team: &Team,
            template: &LabelTemplate,
            order: u32,
        ) -> Result<Label> {
            if template.name == self.fail_on {
                return Err(MigrateError::Store("simulated write failure".into()));
            }
            self.inner.create_child(db, team, template, order)
        }
        fn find_child(
            &self,
            db: &Db,
            team: &Team,
            template: &LabelTemplate,
        ) -> Result<Option<Label>> {
            self.inner.find_child(db, team, template)
        }
    }

    fn label_names(db: &Db, team: &Team) -> Vec<String> {
        let mut names: Vec<String> = db
            .labels_for_team(&team.id)
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn empty_team_gets_every_template() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();

        let report = run_migration(&db, &migration(), Utc::now()).unwrap();

        assert_eq!(report.totals.created, 11);
        let mut expected: Vec<String> = default_labels().into_iter().map(|t| t.name).collect();
        expected.sort();
        assert_eq!(label_names(&db, &team), expected);
    }

    #[test]
    fn existing_feature_label_is_reused_not_duplicated() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();
        let feature = db.create_label(&team.id, "Feature", "#123456").unwrap();

        let report = run_migration(&db, &migration(), Utc::now()).unwrap();

        assert_eq!(report.totals.created, 10);
        assert_eq!(report.totals.reused, 1);
        assert_eq!(report.parents[0].skipped, vec!["Feature".to_string()]);
        assert_eq!(db.count_labels(&team.id).unwrap(), 11);

        let stored = db.find_label(&team.id, "Feature").unwrap().unwrap();
        assert_eq!(stored.id, feature.id);
        assert_eq!(stored.color, "#123456");
    }

    #[test]
    fn non_duplicate_failure_is_isolated_to_one_child() {
        let db = Db::open_memory().unwrap();
        let first = db.insert_team("Core").unwrap();
        let second = db.insert_team("Web").unwrap();
        let failing = FailingLabels {
            inner: migration(),
            fail_on: "Documentation",
        };

        let report = run_migration(&db, &failing, Utc::now()).unwrap();

        assert_eq!(report.totals.failed, 2);
        assert_eq!(report.totals.created, 20);
        assert_eq!(db.count_labels(&first.id).unwrap(), 10);
        assert_eq!(db.count_labels(&second.id).unwrap(), 10);
        assert!(db.find_label(&first.id, "Bug").unwrap().is_some());
        assert!(db.find_label(&first.id, "Duplicate").unwrap().is_some());
        assert!(db.find_label(&first.id, "Documentation").unwrap().is_none());
        assert_eq!(report.parents[0].failed[0].name, "Documentation");
        assert!(report.parents[0].failed[0].reason.contains("simulated"));

        let run = db.migration_run(LabelMigration::NAME).unwrap().unwrap();
        assert_eq!(run.failed, 2);
        assert!(!run.is_clean());
    }

    #[test]
    fn name_scope_does_not_skip_teams_with_labels() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();
        db.create_label(&team.id, "Custom", "#000000").unwrap();

        let applied = apply_to_parent(&db, &migration(), &team, &default_labels()).unwrap();

        let ParentApply::Applied(result) = applied else {
            panic!("name-scoped migration must not skip the parent");
        };
        assert_eq!(result.created.len(), 11);
        assert_eq!(db.count_labels(&team.id).unwrap(), 12);
    }

    #[test]
    fn legacy_card_labels_are_linked_and_unknown_names_reported() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();
        let project = db.insert_project(&team.id, "Apollo", None).unwrap();
        let card = db
            .insert_card(&project.id, "Login", &["Bug", " Urgent ", "wontfix", ""])
            .unwrap();
        let plain = db.insert_card(&project.id, "Docs", &[]).unwrap();

        let report = run_migration(&db, &migration(), Utc::now()).unwrap();

        assert_eq!(report.totals.links_created, 2);
        assert_eq!(report.parents[0].unmatched, vec!["wontfix".to_string()]);
        assert_eq!(db.card_label_ids(&card.id).unwrap().len(), 2);
        assert!(db.card_label_ids(&plain.id).unwrap().is_empty());
        assert_eq!(report.parents[0].status, ParentStatus::Applied);
    }

    #[test]
    fn unreadable_legacy_column_fails_only_that_card() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();
        let project = db.insert_project(&team.id, "Apollo", None).unwrap();
        let broken = db.insert_card(&project.id, "Broken", &[]).unwrap();
        db.conn()
            .execute(
                "UPDATE cards SET legacy_labels = 'Bug,Feature' WHERE id = ?1",
                [&broken.id],
            )
            .unwrap();
        let good = db.insert_card(&project.id, "Good", &["Feature"]).unwrap();

        let report = run_migration(&db, &migration(), Utc::now()).unwrap();

        assert_eq!(report.totals.created, 11);
        assert_eq!(report.totals.failed, 1);
        assert!(report.parents[0].failed[0].name.contains(&broken.id));
        assert_eq!(db.card_label_ids(&good.id).unwrap().len(), 1);
    }

    #[test]
    fn card_fixed_after_a_failed_run_is_linked_on_rerun() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();
        let project = db.insert_project(&team.id, "Apollo", None).unwrap();
        let broken = db.insert_card(&project.id, "Broken", &[]).unwrap();
        db.conn()
            .execute(
                "UPDATE cards SET legacy_labels = 'Bug' WHERE id = ?1",
                [&broken.id],
            )
            .unwrap();
        db.insert_card(&project.id, "Good", &["Feature"]).unwrap();

        let first = run_migration(&db, &migration(), Utc::now()).unwrap();
        assert_eq!(first.totals.failed, 1);
        assert!(db.card_label_ids(&broken.id).unwrap().is_empty());

        db.conn()
            .execute(
                "UPDATE cards SET legacy_labels = '[\"Bug\"]' WHERE id = ?1",
                [&broken.id],
            )
            .unwrap();

        let second = run_migration(&db, &migration(), Utc::now()).unwrap();
        assert!(!second.already_migrated);
        assert_eq!(second.totals.created, 0);
        assert_eq!(second.totals.reused, 11);
        assert_eq!(second.totals.failed, 0);
        assert_eq!(second.totals.links_created, 1);
        assert_eq!(db.card_label_ids(&broken.id).unwrap().len(), 1);
        assert_eq!(db.count_labels(&team.id).unwrap(), 11);

        let third = run_migration(&db, &migration(), Utc::now()).unwrap();
        assert!(third.already_migrated);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();
        let project = db.insert_project(&team.id, "Apollo", None).unwrap();
        db.insert_card(&project.id, "Login", &["Bug"]).unwrap();

        let first = run_migration(&db, &migration(), Utc::now()).unwrap();
        assert!(!first.already_migrated);

        let second = run_migration(&db, &migration(), Utc::now()).unwrap();
        assert!(second.already_migrated);
        assert_eq!(second.totals.created, 0);
        assert_eq!(db.count_labels(&team.id).unwrap(), 11);
    }

    #[test]
    fn existing_card_link_short_circuits_without_writes() {
        let db = Db::open_memory().unwrap();
        let team = db.insert_team("Core").unwrap();
        let project = db.insert_project(&team.id, "Apollo", None).unwrap();
        let card = db.insert_card(&project.id, "Login", &[]).unwrap();
        let label = db.create_label(&team.id, "Organic", "#ffffff").unwrap();
        db.link_card_label(&card.id, &label.id).unwrap();

        let report = run_migration(&db, &migration(), Utc::now()).unwrap();

        assert!(report.already_migrated);
        assert_eq!(db.count_labels(&team.id).unwrap(), 1);
        assert!(db.migration_run(LabelMigration::NAME).unwrap().is_none());
    }
}
