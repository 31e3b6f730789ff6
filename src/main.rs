use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use voting_client::{
    init_telemetry, ledger_metrics, Address, ClientConfig, InMemoryLedger, Ledger, OperationRegistry,
    RegisterProposalForm, RegisterVoterForm, ResultView, TrackedOutcome, VoteForm, WorkflowStage,
    WorkflowStatusController,
};

/// First account of a local hardhat node, the owner unless `ledger.account` is set
const SIMULATED_OWNER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

const SIMULATED_VOTERS: [&str; 3] = [
    "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
    "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc",
    "0x90f79bf6eb2c4f870365e785982e1f101e93b906",
];

const SIMULATED_PROPOSALS: [&str; 3] = ["Plant trees in the yard", "Open a community library", "Free coffee on Fridays"];

#[derive(Parser)]
#[command(name = "voting-client")]
#[command(about = "Coordination client for an owner-driven voting contract")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the workflow stages and the operation that advances each one
    Stages,
    /// Run a complete voting round against an in-process contract
    Simulate {
        /// Receipt polls before each transaction is final
        #[arg(long, default_value = "1", help = "Number of pending receipt polls per transaction")]
        confirmation_polls: u32,
        /// Number of voters to register (1-3)
        #[arg(long, default_value = "3", help = "Number of simulated voters (1-3)")]
        voters: usize,
    },
    /// Print the effective configuration
    Config {
        /// Write the configuration to this TOML file instead of printing it
        #[arg(long, help = "Write the effective configuration to a TOML file")]
        save: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ClientConfig::load_env_file()?;
    let config = ClientConfig::load()?;

    match cli.command {
        None => {
            println!("voting-client: run `voting-client stages` or `voting-client simulate`");
            Ok(())
        }
        Some(Commands::Stages) => stages_command(),
        Some(Commands::Simulate { confirmation_polls, voters }) => {
            init_telemetry(&config.observability)?;
            runtime()?.block_on(async { simulate_command(&config, confirmation_polls, voters).await })
        }
        Some(Commands::Config { save }) => config_command(&config, save),
    }
}

/// Everything here is cooperative on one thread
fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
}

fn stages_command() -> Result<()> {
    let registry = OperationRegistry::new();
    println!("{:<3} {:<30} {:<20} NEXT OPERATION", "#", "STAGE", "LABEL");
    for stage in WorkflowStage::ALL {
        let next = registry
            .operation_for_stage(stage.index())
            .map(|op| op.name())
            .unwrap_or("-");
        println!("{:<3} {:<30} {:<20} {}", stage.index(), stage.name(), stage.label(), next);
    }
    Ok(())
}

fn config_command(config: &ClientConfig, save: Option<PathBuf>) -> Result<()> {
    match save {
        Some(path) => {
            config.save_to_file(&path)?;
            println!("Configuration written to {}", path.display());
        }
        None => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

async fn simulate_command(config: &ClientConfig, confirmation_polls: u32, voters: usize) -> Result<()> {
    if !(1..=SIMULATED_VOTERS.len()).contains(&voters) {
        bail!("--voters must be between 1 and {}", SIMULATED_VOTERS.len());
    }
    let voters: Vec<Address> = SIMULATED_VOTERS[..voters]
        .iter()
        .map(|raw| Address::parse(raw))
        .collect::<Result<_, _>>()?;

    let owner_account = config.ledger.account_or(&Address::parse(SIMULATED_OWNER)?)?;
    let contract = InMemoryLedger::deploy(owner_account);
    contract.set_confirmation_polls(confirmation_polls);
    let owner: Arc<dyn Ledger> = Arc::new(contract.clone());
    let poll = config.confirmation.poll_interval();

    let mut controller = WorkflowStatusController::new(Arc::clone(&owner), config);
    let stage = controller.start().await?;
    println!("Contract deployed, stage: {}", stage.label());

    let mut register = RegisterVoterForm::new(Arc::clone(&owner), poll);
    for voter in &voters {
        register.set_address(voter.as_str());
        register.submit().await?;
        expect_confirmed(register.settle().await)?;
        println!("Registered voter {voter}");
    }

    advance(&mut controller).await?;

    for (voter, description) in voters.iter().zip(SIMULATED_PROPOSALS) {
        let mut form = RegisterProposalForm::new(Arc::new(contract.connect(voter.clone())), poll);
        form.set_description(description);
        form.submit().await?;
        expect_confirmed(form.settle().await)?;
        println!("{voter} proposed \"{description}\"");
    }

    advance(&mut controller).await?;
    advance(&mut controller).await?;

    for (i, voter) in voters.iter().enumerate() {
        let mut ballot = VoteForm::new(Arc::new(contract.connect(voter.clone())), poll);
        let last = ballot.load_proposals().await?.last().map(|p| p.id).unwrap_or(0);
        // odd voters back proposal 1, even voters proposal 2 (0 is GENESIS)
        let choice = (1 + i as u64 % 2).min(last);
        ballot.vote(choice).await?;
        expect_confirmed(ballot.settle().await)?;
        println!("{voter} voted for proposal {choice}");
    }

    advance(&mut controller).await?;
    advance(&mut controller).await?;

    let results = ResultView::new(Arc::new(contract.connect(voters[0].clone())));
    match results.winning_proposal().await? {
        Some(winner) => println!(
            "Winning proposal #{}: \"{}\" with {} vote(s)",
            winner.id, winner.description, winner.vote_count
        ),
        None => println!("No results available yet"),
    }

    controller.shutdown();
    ledger_metrics().log_stats();
    Ok(())
}

async fn advance(controller: &mut WorkflowStatusController) -> Result<()> {
    controller.advance().await?;
    match tokio::time::timeout(Duration::from_secs(1), controller.next_change()).await {
        Ok(Some(change)) => println!("{}", change.describe()),
        Ok(None) => println!("Event subscription closed, stage is {}", controller.current_stage().label()),
        Err(_) => println!("No change event yet, stage is {}", controller.current_stage().label()),
    }
    Ok(())
}

fn expect_confirmed(outcome: Option<TrackedOutcome>) -> Result<()> {
    match outcome {
        Some(TrackedOutcome::Confirmed(_)) => Ok(()),
        Some(TrackedOutcome::Failed(error)) => Err(error.into()),
        None => bail!("nothing was waiting for confirmation"),
    }
}
