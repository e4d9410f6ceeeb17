use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use cw_controller::distribution::{DistributionDraft, DistributionEditor, ListReview};
use cw_controller::ChoreController;
use cw_core::allocation::bps_to_percent;

#[derive(Debug, Subcommand)]
pub enum ListsAction {
    /// Show every list with its effective shares.
    Show { chore: String },

    /// Write an existing list to a TOML draft for editing.
    Export {
        chore: String,
        list_id: u64,
        file: PathBuf,
    },

    /// Create a list from a TOML draft.
    Add { chore: String, file: PathBuf },

    /// Replace a list with the contents of a TOML draft.
    Update {
        chore: String,
        list_id: u64,
        file: PathBuf,
    },

    /// Delete a list.
    Remove { chore: String, list_id: u64 },
}

pub async fn run(controller: &ChoreController, action: ListsAction) -> Result<()> {
    match action {
        ListsAction::Show { chore } => {
            let editor = DistributionEditor::load(controller, &chore).await?;
            print!("{}", render(&editor.reviews()));
        }
        ListsAction::Export {
            chore,
            list_id,
            file,
        } => {
            let editor = DistributionEditor::load(controller, &chore).await?;
            let draft = editor
                .edit(list_id)
                .with_context(|| format!("{chore} has no distribution list {list_id}"))?;
            draft
                .save(&file)
                .with_context(|| format!("failed to write {}", file.display()))?;
            println!("wrote list {list_id} to {}", file.display());
        }
        ListsAction::Add { chore, file } => {
            let mut draft = load_draft(&file)?;
            draft.list_id = None;
            submit(controller, &chore, &draft).await?;
        }
        ListsAction::Update {
            chore,
            list_id,
            file,
        } => {
            let mut draft = load_draft(&file)?;
            draft.list_id = Some(list_id);
            submit(controller, &chore, &draft).await?;
        }
        ListsAction::Remove { chore, list_id } => {
            let mut editor = DistributionEditor::load(controller, &chore).await?;
            editor.remove(controller, list_id).await?;
            println!("removed list {list_id}; {} remaining", editor.lists().len());
        }
    }
    Ok(())
}

fn load_draft(file: &Path) -> Result<DistributionDraft> {
    DistributionDraft::load(file).with_context(|| format!("failed to read {}", file.display()))
}

async fn submit(controller: &ChoreController, chore: &str, draft: &DistributionDraft) -> Result<()> {
    let preview = draft.preview()?;
    if let Some(note) = preview.summary() {
        println!("note: {note}");
    }
    let mut editor = DistributionEditor::load(controller, chore).await?;
    let id = editor.submit(controller, draft).await?;
    println!("saved list {id}");
    if let Some(review) = editor.reviews().into_iter().find(|r| r.list.id == id) {
        print!("{}", render(&[review]));
    }
    Ok(())
}

pub fn render(reviews: &[ListReview]) -> String {
    let mut out = String::new();
    if reviews.is_empty() {
        let _ = writeln!(out, "no distribution lists");
        return out;
    }
    for review in reviews {
        let def = &review.list.def;
        let _ = writeln!(out, "[{}] {}", review.list.id, def.name);
        let _ = writeln!(
            out,
            "  token {}  threshold {}  max per round {}",
            def.token_ledger_id, def.threshold_amount, def.max_distribution_amount
        );
        if let Some(source) = &def.source_subaccount {
            let _ = writeln!(out, "  source subaccount {source}");
        }
        for (target, effective) in review.rows() {
            let assigned = target
                .basis_points
                .map_or_else(|| "auto".to_string(), |bp| format!("{}%", bps_to_percent(u32::from(bp))));
            let _ = writeln!(
                out,
                "  {:<64} {:>8} -> {}%",
                target.account.to_string(),
                assigned,
                bps_to_percent(effective)
            );
        }
        if let Some(note) = review.allocation.summary() {
            let _ = writeln!(out, "  note: {note}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::connect;
    use cw_core::config::Config;

    const DRAFT: &str = r#"
name = "Team"
token_ledger_id = "ryjl3-tyaaa-aaaaa-aaaba-cai"
threshold_amount = 100
max_distribution_amount = 1000

[[targets]]
owner = "rrkah-fqaaa-aaaaa-aaaaq-cai"
percent = 60.0

[[targets]]
owner = "qoctq-giaaa-aaaaa-aaaea-cai"
percent = 60.0

[[targets]]
owner = "aaaaa-aa"
"#;

    #[tokio::test]
    async fn add_export_update_remove() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("team.toml");
        std::fs::write(&file, DRAFT).unwrap();
        let controller = connect(&Config::default(), true).await.unwrap();
        let chore = "distribute-funds".to_string();

        run(
            &controller,
            ListsAction::Add {
                chore: chore.clone(),
                file: file.clone(),
            },
        )
        .await
        .unwrap();

        let editor = DistributionEditor::load(&controller, &chore).await.unwrap();
        let review = &editor.reviews()[0];
        assert!(review.allocation.is_oversubscribed());
        assert_eq!(review.allocation.effective, vec![5000, 5000, 0]);
        let text = render(&editor.reviews());
        assert!(text.contains("scaled down to 100%"), "{text}");
        assert_eq!(text.matches("60% -> 50%").count(), 2, "{text}");
        assert!(text.contains("auto -> 0%"), "{text}");

        let exported = dir.path().join("export.toml");
        run(
            &controller,
            ListsAction::Export {
                chore: chore.clone(),
                list_id: review.list.id,
                file: exported.clone(),
            },
        )
        .await
        .unwrap();
        let mut draft = DistributionDraft::load(&exported).unwrap();
        assert_eq!(draft.list_id, Some(review.list.id));
        draft.targets.truncate(1);
        draft.save(&exported).unwrap();

        run(
            &controller,
            ListsAction::Update {
                chore: chore.clone(),
                list_id: review.list.id,
                file: exported,
            },
        )
        .await
        .unwrap();
        let editor = DistributionEditor::load(&controller, &chore).await.unwrap();
        assert_eq!(editor.lists()[0].def.targets.len(), 1);

        run(
            &controller,
            ListsAction::Remove {
                chore,
                list_id: review.list.id,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn invalid_draft_is_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "name = \"Empty\"\ntoken_ledger_id = \"ryjl3-tyaaa-aaaaa-aaaba-cai\"\n")
            .unwrap();
        let controller = connect(&Config::default(), true).await.unwrap();

        let err = run(
            &controller,
            ListsAction::Add {
                chore: "distribute-funds".into(),
                file,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("at least one target"), "{err}");
    }
}
