#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use gohoubi_lib::{
    catalog::DEFAULT_ACTIONS,
    compose::{compose, Reply, RETRY_LATER_MESSAGE},
    household::HouseholdScope,
    ledger::memory::LedgerOp,
    model::{Child, Household, PointTotals, Record},
    MemoryLedger,
};

#[path = "util.rs"]
mod util;

use util::{memory_handler, NOON_JST, YESTERDAY_LATE_JST};

const SHARE_CODE: &str = "abc123xyz789";
const USER: &str = "U-parent";

fn seeded(child_name: &str) -> (Arc<MemoryLedger>, Household, Child) {
    let ledger = Arc::new(MemoryLedger::new());
    let household = ledger.add_household(SHARE_CODE);
    for (name, points) in DEFAULT_ACTIONS {
        ledger.add_action(&household.id, name, *points);
    }
    let child = ledger.add_child(&household.id, child_name, None);
    (ledger, household, child)
}

async fn linked(child_name: &str) -> (Arc<MemoryLedger>, Household, Child) {
    let (ledger, household, child) = seeded(child_name);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);
    let reply = handler
        .handle_at(&format!("登録 {SHARE_CODE}"), USER, NOON_JST)
        .await;
    assert_eq!(reply, compose(&Reply::Linked));
    (ledger, household, child)
}

fn totals(ledger: &MemoryLedger, child: &Child) -> PointTotals {
    ledger.snapshot_child(&child.id).expect("child exists").totals()
}

#[tokio::test]
async fn records_action_and_reports_today_and_total() {
    let (ledger, _, child) = linked("").await;
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("宿題やった", USER, NOON_JST).await;

    assert_eq!(
        reply,
        "✅ 宿題を記録しました！（+1pt）\n今日は 1pt、累計は 1pt です。"
    );
    assert_eq!(
        totals(&ledger, &child),
        PointTotals {
            total_points: 1,
            cycle_points: 1
        }
    );
    let records = ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "line");
    assert!(records[0].action_id.is_some());
}

#[tokio::test]
async fn crossing_threshold_announces_reward_and_carries_overflow() {
    let (ledger, _, child) = linked("たろう").await;
    ledger.set_totals(
        &child.id,
        PointTotals {
            total_points: 98,
            cycle_points: 98,
        },
    );
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("スタスタした！", USER, NOON_JST).await;

    assert!(reply.starts_with("【たろう】✅ スタスタを記録しました！（+3pt）"));
    assert!(reply.contains("累計は 101pt"));
    assert!(reply.ends_with("🎉 おめでとう！100ptたまりました！ごほうびを一緒に決めよう！"));
    assert_eq!(
        totals(&ledger, &child),
        PointTotals {
            total_points: 101,
            cycle_points: 1
        }
    );
}

#[tokio::test]
async fn today_query_wins_over_action_name() {
    let (ledger, _, _) = linked("").await;
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("今日のポイント 宿題", USER, NOON_JST).await;

    assert_eq!(reply, "今日はまだ記録がありません。\nがんばったことを送ってね！");
    assert!(ledger.records().is_empty());
    assert_eq!(ledger.calls(LedgerOp::AppendRecord), 0);
}

#[tokio::test]
async fn same_action_twice_is_one_bullet() {
    let (ledger, _, _) = linked("").await;
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    handler.handle_at("宿題おわった", USER, NOON_JST).await;
    handler.handle_at("早寝した", USER, NOON_JST + 1_000).await;
    let second = handler.handle_at("宿題またやった", USER, NOON_JST + 2_000).await;
    assert!(second.contains("今日は 4pt、累計は 4pt"));

    let reply = handler.handle_at("今日のポイントは？", USER, NOON_JST + 3_000).await;
    assert_eq!(reply, "📊 今日のポイントは 4pt です。\n・宿題 2回\n・早寝 1回");
}

#[tokio::test]
async fn earlier_local_day_is_not_counted_as_today() {
    let (ledger, _, child) = linked("").await;
    ledger.insert_record(Record {
        id: "r-yesterday".into(),
        child_id: child.id.clone(),
        action_id: None,
        action_name: "お手伝い".into(),
        points: 2,
        recorded_at: YESTERDAY_LATE_JST,
        source: "line".into(),
    });
    ledger.set_totals(
        &child.id,
        PointTotals {
            total_points: 2,
            cycle_points: 2,
        },
    );
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("宿題", USER, NOON_JST).await;

    assert!(reply.contains("今日は 1pt、累計は 3pt"), "{reply}");
}

#[tokio::test]
async fn empty_link_command_shows_usage_without_touching_storage() {
    let (ledger, _, _) = seeded("");
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("登録　", USER, NOON_JST).await;

    assert_eq!(reply, compose(&Reply::LinkUsage));
    assert_eq!(ledger.calls(LedgerOp::LinkChatUser), 0);
    assert_eq!(ledger.calls(LedgerOp::HouseholdByChatUser), 0);
}

#[tokio::test]
async fn bare_link_command_shows_usage() {
    let (ledger, _, _) = seeded("");
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    for text in ["登録", "登録 ", "  登録\u{3000}\u{3000}"] {
        let reply = handler.handle_at(text, USER, NOON_JST).await;
        assert_eq!(reply, compose(&Reply::LinkUsage), "text {text:?}");
    }
    assert_eq!(ledger.calls(LedgerOp::LinkChatUser), 0);
}

#[tokio::test]
async fn linking_twice_reports_already_linked() {
    let (ledger, _, _) = linked("").await;
    let other = ledger.add_household("other-code");
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("登録 other-code", USER, NOON_JST).await;
    assert_eq!(reply, compose(&Reply::AlreadyLinked));

    let bogus = handler.handle_at("登録 does-not-exist", USER, NOON_JST).await;
    assert_eq!(bogus, compose(&Reply::AlreadyLinked));

    let resolved = handler.linker().resolve_household(USER).await.unwrap();
    assert_ne!(resolved.map(|h| h.id), Some(other.id));
}

#[tokio::test]
async fn unknown_share_code_is_rejected() {
    let (ledger, _, _) = seeded("");
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("登録 nope", USER, NOON_JST).await;
    assert_eq!(reply, compose(&Reply::InvalidShareCode));

    let after = handler.handle_at("宿題", USER, NOON_JST).await;
    assert_eq!(after, compose(&Reply::NotLinked));
}

#[tokio::test]
async fn unlinked_user_is_told_how_to_link() {
    let (ledger, _, _) = seeded("");
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("宿題やった", "U-stranger", NOON_JST).await;

    assert!(reply.starts_with("まだ家庭と紐付けられていません。"));
    assert!(ledger.records().is_empty());
}

#[tokio::test]
async fn unknown_message_lists_each_action_name_once() {
    let (ledger, _, _) = linked("").await;
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("おはよう", USER, NOON_JST).await;

    assert!(reply.contains("「宿題」「スタスタ」「早寝」「お手伝い」などの言葉"));
    assert_eq!(reply.matches("宿題").count(), 1);
    assert!(ledger.records().is_empty());
}

#[tokio::test]
async fn household_without_actions_asks_for_catalog() {
    let ledger = Arc::new(MemoryLedger::new());
    let household = ledger.add_household(SHARE_CODE);
    ledger.add_child(&household.id, "", None);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);
    handler
        .handle_at(&format!("登録 {SHARE_CODE}"), USER, NOON_JST)
        .await;

    let reply = handler.handle_at("宿題やった", USER, NOON_JST).await;

    assert_eq!(reply, compose(&Reply::NoActions));
}

#[tokio::test]
async fn household_without_children_is_reported() {
    let ledger = Arc::new(MemoryLedger::new());
    let household = ledger.add_household(SHARE_CODE);
    ledger.add_action(&household.id, "宿題", 1);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);
    handler
        .handle_at(&format!("登録 {SHARE_CODE}"), USER, NOON_JST)
        .await;

    let reply = handler.handle_at("宿題やった", USER, NOON_JST).await;

    assert_eq!(reply, compose(&Reply::NoChildren));
}

#[tokio::test]
async fn first_child_by_creation_gets_the_points() {
    let (ledger, household, first) = linked("").await;
    let second = ledger.add_child(&household.id, "じろう", None);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    handler.handle_at("早寝", USER, NOON_JST).await;

    assert_eq!(totals(&ledger, &first).total_points, 2);
    assert_eq!(totals(&ledger, &second).total_points, 0);
}

#[tokio::test]
async fn nickname_is_used_as_prefix() {
    let ledger = Arc::new(MemoryLedger::new());
    let household = ledger.add_household(SHARE_CODE);
    ledger.add_action(&household.id, "宿題", 1);
    ledger.add_child(&household.id, "太郎", Some("たっくん"));
    let handler = memory_handler(&ledger, HouseholdScope::Fixed(household));

    let reply = handler.handle_at("宿題", USER, NOON_JST).await;

    assert!(reply.starts_with("【たっくん】✅"), "{reply}");
}

#[tokio::test]
async fn reward_status_shows_progress_and_goals() {
    let (ledger, household, child) = linked("").await;
    ledger.set_totals(
        &child.id,
        PointTotals {
            total_points: 240,
            cycle_points: 40,
        },
    );
    ledger.add_goal(&household.id, "ゲーム", Some(100));
    ledger.add_goal(&household.id, "本", None);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("ご褒美まであと何点？", USER, NOON_JST).await;

    assert!(reply.contains("現在のポイント: 40pt"));
    assert!(reply.contains("累計ポイント: 240pt"));
    assert!(reply.contains("100ptのごほうびまで、あと 60pt！"));
    assert!(reply.ends_with("📌 目標:\n・ゲーム（100pt）\n・本"));
}

#[tokio::test]
async fn failed_append_writes_nothing() {
    let (ledger, _, child) = linked("").await;
    ledger.fail(LedgerOp::AppendRecord);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("宿題やった", USER, NOON_JST).await;

    assert_eq!(reply, RETRY_LATER_MESSAGE);
    assert_eq!(ledger.calls(LedgerOp::UpdateChildPoints), 0);
    assert_eq!(totals(&ledger, &child), PointTotals::default());
}

#[tokio::test]
async fn failed_update_keeps_the_record() {
    let (ledger, _, child) = linked("").await;
    ledger.fail(LedgerOp::UpdateChildPoints);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("宿題やった", USER, NOON_JST).await;

    assert_eq!(reply, RETRY_LATER_MESSAGE);
    assert_eq!(ledger.records().len(), 1);
    assert_eq!(totals(&ledger, &child), PointTotals::default());

    ledger.recover(LedgerOp::UpdateChildPoints);
    let retried = handler.handle_at("宿題やった", USER, NOON_JST + 1_000).await;
    assert!(retried.contains("今日は 2pt、累計は 1pt"), "{retried}");
}

#[tokio::test]
async fn lookup_failure_answers_with_retry_text() {
    let (ledger, _, _) = linked("").await;
    ledger.fail(LedgerOp::HouseholdByChatUser);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("今日のポイント", USER, NOON_JST).await;

    assert_eq!(reply, RETRY_LATER_MESSAGE);
}

#[tokio::test]
async fn concurrent_write_is_retried_on_fresh_totals() {
    let (ledger, _, child) = linked("").await;
    ledger.interleave_write(&child.id, 2);
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("宿題やった", USER, NOON_JST).await;

    assert!(reply.contains("累計は 3pt"), "{reply}");
    assert_eq!(ledger.calls(LedgerOp::UpdateChildPoints), 2);
    assert_eq!(
        totals(&ledger, &child),
        PointTotals {
            total_points: 3,
            cycle_points: 3
        }
    );
}

#[tokio::test]
async fn persistent_conflict_gives_up_after_bounded_attempts() {
    let (ledger, _, child) = linked("").await;
    for _ in 0..3 {
        ledger.interleave_write(&child.id, 1);
    }
    let handler = memory_handler(&ledger, HouseholdScope::Linked);

    let reply = handler.handle_at("宿題やった", USER, NOON_JST).await;

    assert_eq!(reply, RETRY_LATER_MESSAGE);
    assert_eq!(ledger.calls(LedgerOp::UpdateChildPoints), 3);
    assert_eq!(ledger.records().len(), 1);
}

#[tokio::test]
async fn single_tenancy_needs_no_link_and_refuses_one() {
    let (ledger, household, child) = seeded("");
    let handler = memory_handler(&ledger, HouseholdScope::Fixed(household));

    let link = handler.handle_at(&format!("登録 {SHARE_CODE}"), USER, NOON_JST).await;
    assert_eq!(link, compose(&Reply::AlreadyLinked));
    assert_eq!(ledger.calls(LedgerOp::LinkChatUser), 0);

    let reply = handler.handle_at("お手伝いしたよ", "anyone", NOON_JST).await;
    assert!(reply.contains("（+2pt）"));
    assert_eq!(totals(&ledger, &child).total_points, 2);
}
