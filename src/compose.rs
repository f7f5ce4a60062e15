//! Reply text for every handler outcome. Pure; no I/O.

use crate::catalog::NAME_DELIMITER;
use crate::model::{Goal, TodaySummary};

/// Fixed text for storage failures and anything unexpected in the pipeline.
pub const RETRY_LATER_MESSAGE: &str =
    "エラーが発生しました。しばらくしてからもう一度お試しください。";

pub const MAX_GOALS_SHOWN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    NotLinked,
    LinkUsage,
    AlreadyLinked,
    InvalidShareCode,
    Linked,
    NoChildren,
    NoActions,
    Recorded {
        child_name: String,
        action_name: String,
        points: i64,
        today_points: i64,
        total_points: i64,
        reward_achieved: bool,
        threshold: i64,
    },
    Today {
        child_name: String,
        summary: TodaySummary,
    },
    RewardStatus {
        child_name: String,
        cycle_points: i64,
        total_points: i64,
        threshold: i64,
        goals: Vec<Goal>,
    },
    Unknown {
        action_names: Vec<String>,
    },
    StorageFailure,
}

impl Reply {
    pub fn label(&self) -> &'static str {
        match self {
            Reply::NotLinked => "not_linked",
            Reply::LinkUsage => "link_usage",
            Reply::AlreadyLinked => "already_linked",
            Reply::InvalidShareCode => "invalid_share_code",
            Reply::Linked => "linked",
            Reply::NoChildren => "no_children",
            Reply::NoActions => "no_actions",
            Reply::Recorded { .. } => "recorded",
            Reply::Today { .. } => "today",
            Reply::RewardStatus { .. } => "reward_status",
            Reply::Unknown { .. } => "unknown",
            Reply::StorageFailure => "storage_failure",
        }
    }
}

fn name_prefix(child_name: &str) -> String {
    if child_name.is_empty() {
        String::new()
    } else {
        format!("【{child_name}】")
    }
}

fn reward_block(threshold: i64) -> String {
    format!("\n\n🎉 おめでとう！{threshold}ptたまりました！ごほうびを一緒に決めよう！")
}

pub fn compose(reply: &Reply) -> String {
    match reply {
        Reply::NotLinked => "まだ家庭と紐付けられていません。\n\n\
             紐付けるには、Webアプリの「共有URL」画面に表示されている共有コードを使って、\n\
             「登録 共有コード」\nと送ってください。\n\n例: 「登録 abc123xyz789」"
            .to_string(),
        Reply::LinkUsage => "共有コードを入力してください。\n例: 「登録 abc123xyz789」\n\n\
             共有コードはWebアプリの「共有URL」画面で確認できます。"
            .to_string(),
        Reply::AlreadyLinked => "すでに家庭と紐付けられています。\n\
             別の家庭に変更する場合は、管理者にお問い合わせください。"
            .to_string(),
        Reply::InvalidShareCode => "共有コードが見つかりませんでした。\n\
             正しいコードを入力してください。\n\n\
             共有コードはWebアプリの「共有URL」画面で確認できます。"
            .to_string(),
        Reply::Linked => "✅ 紐付けが完了しました！\n\nこれで行動を記録できます。\n\
             「宿題やった」などと送ってみてください。"
            .to_string(),
        Reply::NoChildren => {
            "お子さんが登録されていません。\nWebアプリで子どもを登録してください。".to_string()
        }
        Reply::NoActions => {
            "行動が登録されていません。\nWebアプリで行動を登録してください。".to_string()
        }
        Reply::Recorded {
            child_name,
            action_name,
            points,
            today_points,
            total_points,
            reward_achieved,
            threshold,
        } => {
            let mut text = format!(
                "{}✅ {action_name}を記録しました！（+{points}pt）\n\
                 今日は {today_points}pt、累計は {total_points}pt です。",
                name_prefix(child_name)
            );
            if *reward_achieved {
                text.push_str(&reward_block(*threshold));
            }
            text
        }
        Reply::Today {
            child_name,
            summary,
        } => {
            let prefix = name_prefix(child_name);
            if summary.is_empty() {
                return format!("{prefix}今日はまだ記録がありません。\nがんばったことを送ってね！");
            }
            let mut lines = vec![format!(
                "{prefix}📊 今日のポイントは {}pt です。",
                summary.total_points
            )];
            lines.extend(
                summary
                    .actions
                    .iter()
                    .map(|(name, count)| format!("・{name} {count}回")),
            );
            lines.join("\n")
        }
        Reply::RewardStatus {
            child_name,
            cycle_points,
            total_points,
            threshold,
            goals,
        } => {
            let remaining = threshold - cycle_points;
            let mut text = format!(
                "{}🎁 ごほうび状況\n現在のポイント: {cycle_points}pt\n累計ポイント: {total_points}pt\n\n",
                name_prefix(child_name)
            );
            if remaining > 0 {
                text.push_str(&format!("{threshold}ptのごほうびまで、あと {remaining}pt！"));
            } else {
                text.push_str(&format!(
                    "🎉 ごほうび達成済み！次の {threshold}pt を目指そう！"
                ));
            }
            let shown: Vec<String> = goals
                .iter()
                .filter(|goal| !goal.is_achieved)
                .take(MAX_GOALS_SHOWN)
                .map(|goal| match goal.target_points {
                    Some(target) if target > 0 => format!("・{}（{target}pt）", goal.title),
                    _ => format!("・{}", goal.title),
                })
                .collect();
            if !shown.is_empty() {
                text.push_str("\n\n📌 目標:\n");
                text.push_str(&shown.join("\n"));
            }
            text
        }
        Reply::Unknown { action_names } => {
            if action_names.is_empty() {
                return compose(&Reply::NoActions);
            }
            format!(
                "まだその言葉には対応していないよ。\n「{}」などの言葉を含めて送ってね！\n\n\
                 「今日のポイント」で今日の記録を確認できるよ。",
                action_names.join(NAME_DELIMITER)
            )
        }
        Reply::StorageFailure => RETRY_LATER_MESSAGE.to_string(),
    }
}
