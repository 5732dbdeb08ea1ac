//! Example walking a coordinator through a commit and an abort
//!
//! Participants are simulated by the mock engine; every decision they
//! receive is printed at the end.
//!
//! Run with: cargo run --example two_phase_commit

use proven_common::{ParticipantId, SessionId, Timestamp, TransactionKey, TxnNumber};
use proven_coordinator::{CoordinatorConfig, CoordinatorService};
use proven_engine::{MockClient, MockEngine};
use proven_protocol::ParticipantReply;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Two-Phase Commit Example ===\n");

    // 1. Participants reachable through the mock engine
    let engine = Arc::new(MockEngine::new());
    for name in ["orders", "inventory", "billing"] {
        let endpoint = engine.register_participant(name);
        println!("✓ Registered participant {} at {}", name, endpoint);
    }

    // Billing drops the first decision it is sent
    engine.script_reply("billing", ParticipantReply::HostUnreachable);

    // 2. Coordinator service with the default backoff retry
    let client = MockClient::new("coordinator-1".to_string(), engine.clone());
    let service = CoordinatorService::new(Arc::new(client), CoordinatorConfig::default());
    println!("✓ Created coordinator service\n");

    let participants: BTreeSet<ParticipantId> = ["orders", "inventory", "billing"]
        .into_iter()
        .map(ParticipantId::from)
        .collect();

    // 3. A transaction every participant prepares
    println!("=== Committing Transaction ===");
    let session = SessionId::new();
    let commit_key = TransactionKey::new(session, TxnNumber::new(1));
    service.create_coordinator(commit_key, Instant::now() + Duration::from_secs(30))?;

    let decision = service.coordinate_commit(commit_key, participants.clone())?;
    for (i, participant) in participants.iter().enumerate() {
        let prepared_at = Timestamp::from_micros(1_000 + i as u64 * 10);
        service.vote_commit(commit_key, participant.clone(), prepared_at);
        println!("→ {} voted commit at {}", participant, prepared_at);
    }
    println!("✓ Decision for {}: {}\n", commit_key, decision.await);

    while service.contains(&commit_key) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // 4. A transaction one participant refuses
    println!("=== Aborting Transaction ===");
    let abort_key = TransactionKey::new(session, commit_key.txn_number.next());
    service.create_coordinator(abort_key, Instant::now() + Duration::from_secs(30))?;

    let decision = service.coordinate_commit(abort_key, participants.clone())?;
    service.vote_commit(abort_key, ParticipantId::from("orders"), Timestamp::from_micros(2_000));
    println!("→ orders voted commit");
    service.vote_abort(abort_key, ParticipantId::from("inventory"));
    println!("→ inventory voted abort");
    println!("✓ Decision for {}: {}\n", abort_key, decision.await);

    while service.contains(&abort_key) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // 5. A stray vote for a transaction nobody is coordinating
    println!("=== Stray Vote ===");
    let stray_key = TransactionKey::new(SessionId::new(), TxnNumber::new(1));
    service.vote_commit(stray_key, ParticipantId::from("orders"), Timestamp::now());
    engine.wait_for_requests(engine.request_count() + 1, Duration::from_secs(1)).await?;
    println!("→ orders voted commit for unknown {}\n", stray_key);

    println!("=== Delivered Decisions ===");
    for request in engine.requests() {
        let phase = request.message.get_header("txn_phase").unwrap_or("?");
        println!(
            "  [{}] {} -> {:?}",
            request.participant, phase, request.reply
        );
    }

    Ok(())
}
