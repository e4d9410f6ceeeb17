use anyhow::{Context, Result};
use clap::Subcommand;
use cw_controller::ChoreController;
use cw_core::types::{Account, PrincipalId, Subaccount};

#[derive(Debug, Subcommand)]
pub enum MaturityAction {
    /// Show the threshold and destination.
    Show { chore: String },

    /// Set the collection threshold in base units; omit the amount to clear it.
    SetThreshold { chore: String, amount: Option<u64> },

    /// Set the destination account; omit the owner to clear it.
    SetDestination {
        chore: String,
        owner: Option<String>,
        /// Subaccount as 64 hex characters.
        #[arg(long, requires = "owner")]
        subaccount: Option<String>,
    },
}

pub async fn run(controller: &ChoreController, action: MaturityAction) -> Result<()> {
    match action {
        MaturityAction::Show { chore } => {
            let settings = controller.maturity_settings(&chore).await?;
            let threshold = settings
                .threshold_amount
                .map_or_else(|| "not set".to_string(), |a| a.to_string());
            let destination = settings
                .destination
                .map_or_else(|| "not set".to_string(), |a| a.to_string());
            println!("threshold:   {threshold}");
            println!("destination: {destination}");
        }
        MaturityAction::SetThreshold { chore, amount } => {
            controller.set_maturity_threshold(&chore, amount).await?;
            match amount {
                Some(a) => println!("threshold set to {a}"),
                None => println!("threshold cleared"),
            }
        }
        MaturityAction::SetDestination {
            chore,
            owner,
            subaccount,
        } => {
            let destination = owner
                .as_deref()
                .map(|owner| parse_account(owner, subaccount.as_deref()))
                .transpose()?;
            let label = destination.as_ref().map(Account::to_string);
            controller.set_maturity_destination(&chore, destination).await?;
            match label {
                Some(account) => println!("destination set to {account}"),
                None => println!("destination cleared"),
            }
        }
    }
    Ok(())
}

pub fn parse_account(owner: &str, subaccount: Option<&str>) -> Result<Account> {
    let owner = PrincipalId::parse(owner).context("invalid destination owner")?;
    let mut account = Account::new(owner);
    if let Some(hex) = subaccount {
        account = account.with_subaccount(Subaccount::from_hex(hex).context("invalid subaccount")?);
    }
    Ok(account)
}
