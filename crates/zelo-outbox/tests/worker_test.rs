//! Delivery lifecycle integration tests: backoff, dead-lettering, circuit
//! handling and the side effects that follow settled outcomes.

use std::time::Duration;

use anyhow::Result;
use zelo_core::{
    models::{ItemStatus, QuoteStatus, ScheduledSendStatus},
    payload::{MessageContext, MessageIntent},
    Clock,
};
use zelo_outbox::{OutboundMessage, SendOptions, CIRCUIT_OPEN_DELAY_SECS};
use zelo_testing::{fixtures, ItemBuilder, QuoteBuilder, TestEnv};

#[tokio::test]
async fn text_message_travels_end_to_end() -> Result<()> {
    let env = TestEnv::new();
    let receipt = env
        .service()
        .send_text("+5511999998888", "Hello", SendOptions::default())
        .await?;

    env.bridge.push_success("abc");
    let report = env.run_pass().await;
    assert_eq!(report.sent, 1);

    let item = env.item(receipt.item_id).await;
    assert_eq!(item.status, ItemStatus::Sent);
    assert_eq!(item.provider_message_id.as_deref(), Some("abc"));
    assert!(item.sent_at.is_some());
    assert!(item.error.is_none());

    let (phone, message) = env.bridge.last_call();
    assert_eq!(phone, "+5511999998888");
    assert_eq!(message, OutboundMessage::Text { text: "Hello".to_string() });
    Ok(())
}

#[tokio::test]
async fn failures_walk_the_backoff_ladder_then_dead_letter() -> Result<()> {
    let env = TestEnv::new();
    let receipt = env
        .service()
        .send_text("+5511999998888", "teimoso", SendOptions::default())
        .await?;

    let ladder = [5_u64, 30, 120, 600, 3600];
    for (attempt, delay) in ladder.iter().enumerate().take(4) {
        env.bridge.push_failure("bridge down");
        let before = env.clock.now();
        let report = env.run_pass().await;
        assert_eq!(report.retrying, 1, "attempt {}", attempt + 1);

        let item = env.item(receipt.item_id).await;
        assert_eq!(item.retries, i32::try_from(attempt).unwrap() + 1);
        assert_eq!(
            item.scheduled_at,
            Some(before + chrono::Duration::seconds(i64::try_from(*delay).unwrap()))
        );
        env.advance(Duration::from_secs(*delay));
    }

    // Fifth failure exhausts the budget.
    env.bridge.push_failure("bridge down");
    let report = env.run_pass().await;
    assert_eq!(report.dead, 1);

    let item = env.item(receipt.item_id).await;
    assert_eq!(item.status, ItemStatus::Dead);
    assert_eq!(item.retries, 5);
    assert!(item.error.as_deref().unwrap().contains("bridge down"));

    // Dead items are never picked up again.
    env.advance(Duration::from_secs(24 * 3600));
    let report = env.run_pass().await;
    assert_eq!(report.picked, 0);
    Ok(())
}

#[tokio::test]
async fn circuit_open_never_consumes_retry_budget() -> Result<()> {
    let env = TestEnv::new();
    let receipt = env
        .service()
        .send_text("+5511999998888", "paciente", SendOptions::default())
        .await?;

    for round in 0..3 {
        env.bridge.push_circuit_open();
        let before = env.clock.now();
        let report = env.run_pass().await;
        assert_eq!(report.retrying, 1, "round {round}");

        let item = env.item(receipt.item_id).await;
        assert_eq!(item.retries, 0, "round {round}");
        assert_eq!(
            item.scheduled_at,
            Some(before + chrono::Duration::seconds(CIRCUIT_OPEN_DELAY_SECS))
        );
        env.advance(Duration::from_secs(u64::try_from(CIRCUIT_OPEN_DELAY_SECS).unwrap()));
    }

    // Circuit closes; the full budget is still available.
    env.bridge.push_success("wamid-1");
    let report = env.run_pass().await;
    assert_eq!(report.sent, 1);
    Ok(())
}

#[tokio::test]
async fn proposta_with_missing_quote_dies_on_first_attempt() -> Result<()> {
    let env = TestEnv::new();
    let receipt = env
        .service()
        .send_proposta(
            "+5511999998888",
            zelo_core::models::QuoteId::new(),
            SendOptions::default(),
        )
        .await?;

    let report = env.run_pass().await;
    assert_eq!(report.dead, 1);
    assert_eq!(env.bridge.call_count(), 0);

    let item = env.item(receipt.item_id).await;
    assert_eq!(item.status, ItemStatus::Dead);
    assert_eq!(item.retries, 1);
    assert!(item.error.as_deref().unwrap().contains("quote not found"));
    Ok(())
}

#[tokio::test]
async fn delivered_proposta_stamps_quote_and_freezes_price() -> Result<()> {
    let env = TestEnv::new();
    let quote = QuoteBuilder::new().customer("Ana").total_cents(250_000).build();
    let quote_id = quote.id;
    env.store.insert_quote(quote).await;

    env.service()
        .send_proposta("+5511999998888", quote_id, SendOptions::default())
        .await?;
    env.bridge.push_success("wamid-1");
    let report = env.run_pass().await;
    assert_eq!(report.sent, 1);

    let stamped = env.store.quote(quote_id).await.unwrap();
    assert_eq!(stamped.status, QuoteStatus::PropostaEnviada);
    assert_eq!(stamped.price_snapshot_cents, Some(250_000));

    // The caption carried the substituted quote fields.
    let (_, message) = env.bridge.last_call();
    match message {
        OutboundMessage::Document { caption, mime_type, .. } => {
            assert!(caption.contains("Ana"));
            assert!(caption.contains("R$ 2.500,00"));
            assert_eq!(mime_type, "application/pdf");
        }
        other => panic!("expected document, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn contrato_delivery_stamps_contrato_enviado() -> Result<()> {
    let env = TestEnv::new();
    let quote = QuoteBuilder::new().status(QuoteStatus::PropostaEnviada).build();
    let quote_id = quote.id;
    env.store.insert_quote(quote).await;

    env.service()
        .send_contrato("+5511999998888", quote_id, SendOptions::default())
        .await?;
    env.bridge.push_success("wamid-2");
    env.run_pass().await;

    assert_eq!(
        env.store.quote(quote_id).await.unwrap().status,
        QuoteStatus::ContratoEnviado
    );
    Ok(())
}

#[tokio::test]
async fn evaluation_learns_about_delivery() -> Result<()> {
    let env = TestEnv::new();
    let evaluation = fixtures::evaluation();
    let evaluation_id = evaluation.id;
    env.store.insert_evaluation(evaluation).await;

    env.service()
        .send_text(
            "+5511999998888",
            "Como foi o atendimento?",
            SendOptions {
                context: Some(MessageContext {
                    evaluation_id: Some(evaluation_id),
                    scheduled_send_id: None,
                }),
                ..SendOptions::default()
            },
        )
        .await?;
    env.bridge.push_success("wamid-1");
    env.run_pass().await;

    let updated = env.store.evaluation(evaluation_id).await.unwrap();
    assert!(updated.delivered);
    assert_eq!(updated.provider_message_id.as_deref(), Some("wamid-1"));
    assert_eq!(updated.send_attempts, 1);
    Ok(())
}

#[tokio::test]
async fn evaluation_learns_about_dead_letter_but_not_retries() -> Result<()> {
    let env = TestEnv::new();
    let evaluation = fixtures::evaluation();
    let evaluation_id = evaluation.id;
    env.store.insert_evaluation(evaluation).await;

    env.service()
        .send_text(
            "+5511999998888",
            "Como foi o atendimento?",
            SendOptions {
                context: Some(MessageContext {
                    evaluation_id: Some(evaluation_id),
                    scheduled_send_id: None,
                }),
                ..SendOptions::default()
            },
        )
        .await?;

    // A retry must leave the evaluation untouched.
    env.bridge.push_failure("flaky");
    env.run_pass().await;
    assert_eq!(env.store.evaluation(evaluation_id).await.unwrap().send_attempts, 0);

    // Exhaust the remaining budget.
    for delay in [5_u64, 30, 120, 600] {
        env.advance(Duration::from_secs(delay));
        env.bridge.push_failure("still flaky");
        env.run_pass().await;
    }

    let updated = env.store.evaluation(evaluation_id).await.unwrap();
    assert!(!updated.delivered);
    assert!(updated.delivery_error.as_deref().unwrap().contains("still flaky"));
    Ok(())
}

#[tokio::test]
async fn scheduled_send_settles_with_its_message() -> Result<()> {
    let env = TestEnv::new();
    let send = fixtures::scheduled_send();
    let send_id = send.id;
    env.store.insert_scheduled_send(send).await;

    env.service()
        .send_text(
            "+5511999998888",
            "Mensagem agendada",
            SendOptions {
                context: Some(MessageContext {
                    evaluation_id: None,
                    scheduled_send_id: Some(send_id),
                }),
                ..SendOptions::default()
            },
        )
        .await?;
    env.bridge.push_success("wamid-1");
    env.run_pass().await;

    let updated = env.store.scheduled_send(send_id).await.unwrap();
    assert_eq!(updated.status, ScheduledSendStatus::Sent);
    assert!(updated.sent_at.is_some());
    Ok(())
}

#[tokio::test]
async fn template_items_render_before_the_bridge_sees_them() -> Result<()> {
    let env = TestEnv::new();
    let item = ItemBuilder::intent(MessageIntent::SendTemplate {
        template_id: None,
        template_content: Some("Oi {{nome}}, sua consulta é {{quando}}.".to_string()),
        variables: std::collections::HashMap::from([
            ("nome".to_string(), "Clara".to_string()),
            ("quando".to_string(), "amanhã às 10h".to_string()),
        ]),
    })
    .build();
    env.store.insert_item(item).await;

    env.bridge.push_success("wamid-1");
    let report = env.run_pass().await;
    assert_eq!(report.sent, 1);

    let (_, message) = env.bridge.last_call();
    assert_eq!(
        message,
        OutboundMessage::Text {
            text: "Oi Clara, sua consulta é amanhã às 10h.".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn unresolved_template_variable_is_terminal() -> Result<()> {
    let env = TestEnv::new();
    let item = ItemBuilder::intent(MessageIntent::SendTemplate {
        template_id: None,
        template_content: Some("Oi {{nome}}".to_string()),
        variables: std::collections::HashMap::new(),
    })
    .build();
    let id = item.id;
    env.store.insert_item(item).await;

    let report = env.run_pass().await;
    assert_eq!(report.dead, 1);
    let stored = env.item(id).await;
    assert!(stored.error.as_deref().unwrap().contains("nome"));
    Ok(())
}

#[tokio::test]
async fn batch_processes_oldest_first() -> Result<()> {
    let env = TestEnv::new();
    let now = env.clock.now();
    for n in 0..3 {
        let item = ItemBuilder::text(format!("mensagem {n}"))
            .created_at(now - chrono::Duration::seconds(10 - n))
            .build();
        env.store.insert_item(item).await;
    }

    let report = env.run_pass().await;
    assert_eq!(report.sent, 3);

    let texts: Vec<String> = env
        .bridge
        .calls()
        .into_iter()
        .map(|(_, message)| match message {
            OutboundMessage::Text { text } => text,
            other => panic!("unexpected message: {other:?}"),
        })
        .collect();
    assert_eq!(texts, vec!["mensagem 0", "mensagem 1", "mensagem 2"]);
    Ok(())
}
