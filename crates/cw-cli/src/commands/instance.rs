use anyhow::Result;
use cw_controller::ChoreController;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceAction {
    Create {
        chore_type: String,
        instance_id: String,
        label: String,
    },
    Rename {
        chore: String,
        label: String,
    },
    Delete {
        chore: String,
    },
}

pub async fn run(controller: &ChoreController, action: InstanceAction) -> Result<()> {
    match action {
        InstanceAction::Create {
            chore_type,
            instance_id,
            label,
        } => {
            controller
                .create_instance(&chore_type, &instance_id, &label)
                .await?;
            println!("created {instance_id} ({chore_type}), stopped");
        }
        InstanceAction::Rename { chore, label } => {
            controller.rename_instance(&chore, &label).await?;
            println!("{chore} is now labelled {label:?}");
        }
        InstanceAction::Delete { chore } => {
            controller.delete_instance(&chore).await?;
            println!("deleted {chore}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{connect, OFFLINE_CANISTER};
    use cw_core::config::Config;

    #[tokio::test]
    async fn create_rename_delete_offline() {
        let controller = connect(&Config::default(), true).await.unwrap();
        assert_eq!(controller.canister_id(), OFFLINE_CANISTER);

        run(
            &controller,
            InstanceAction::Create {
                chore_type: "distribute_funds".into(),
                instance_id: "split-2".into(),
                label: "Second split".into(),
            },
        )
        .await
        .unwrap();
        run(
            &controller,
            InstanceAction::Rename {
                chore: "split-2".into(),
                label: "Payroll".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            controller.instance("split-2").unwrap().display_name(),
            "Payroll"
        );
        run(
            &controller,
            InstanceAction::Delete {
                chore: "split-2".into(),
            },
        )
        .await
        .unwrap();
        assert!(controller.instance("split-2").is_none());
    }
}
