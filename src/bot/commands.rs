//! Built-in bot commands.

use async_trait::async_trait;
use chrono::Utc;

use crate::bot::ask::Suggestion;
use crate::bot::command::{ArgSpec, Command, Invocation};
use crate::bot::database::User;
use crate::bot::error::BotError;
use crate::bot::schedule::ScheduleExpression;
use crate::bot::transport::QuickReply;

/// Config entry holding the meetup recurrence expression.
pub const MEETUP_TIME_KEY: &str = "meetup_time";
/// Config entry holding the signup-reminder recurrence expression.
pub const SIGNUP_TIME_KEY: &str = "signup_time";

fn format_occurrence(expr: &ScheduleExpression) -> String {
    expr.next_occurrence(Utc::now())
        .format("%A %Y-%m-%d %H:%M UTC")
        .to_string()
}

/// `/start` — introduces the bot.
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    fn aliases(&self) -> &[&'static str] {
        &["/start"]
    }

    fn help(&self) -> &'static str {
        "introduces the bot"
    }

    async fn execute(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
        let mut text = String::from(
            "👋 Hi! I keep track of this group's recurring meetups.\n\n\
             Use /next to see when the next one happens.",
        );
        if let Some(raw) = inv.db().get_entry(MEETUP_TIME_KEY)? {
            if let Ok(expr) = ScheduleExpression::parse(&raw) {
                text.push_str(&format!(
                    "\n\nNext meetup: <b>{}</b>",
                    format_occurrence(&expr)
                ));
            }
        }
        inv.transport().send_message(inv.chat_id, &text, None).await
    }
}

/// `/next` — shows the next scheduled meetup.
pub struct NextCommand;

#[async_trait]
impl Command for NextCommand {
    fn aliases(&self) -> &[&'static str] {
        &["/next"]
    }

    fn help(&self) -> &'static str {
        "shows when the next meetup happens"
    }

    async fn execute(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
        let Some(raw) = inv.db().get_entry(MEETUP_TIME_KEY)? else {
            return inv
                .transport()
                .send_message(
                    inv.chat_id,
                    "No meetup schedule configured yet. An admin can set one via /admin.",
                    None,
                )
                .await;
        };
        let expr = ScheduleExpression::parse(&raw)?;
        let text = format!(
            "📅 Meetups run <b>{}</b>.\nNext one: <b>{}</b>",
            expr,
            format_occurrence(&expr)
        );
        inv.transport().send_message(inv.chat_id, &text, None).await
    }
}

/// `/suggest <text>` — forwards an idea to the admins.
pub struct SuggestCommand;

const SUGGEST_ARGS: &[ArgSpec] = &[ArgSpec::variadic(
    "text",
    "What should I pass on to the organizers?",
)];

#[async_trait]
impl Command for SuggestCommand {
    fn aliases(&self) -> &[&'static str] {
        &["/suggest"]
    }

    fn help(&self) -> &'static str {
        "sends an idea to the organizers"
    }

    fn args(&self) -> &[ArgSpec] {
        SUGGEST_ARGS
    }

    async fn execute(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
        let text = inv.get_or_ask("text").await?;
        let admins = inv.db().list_admins()?;
        let from = inv.user.display();
        for admin in &admins {
            // A private chat's id equals the user's id.
            inv.transport()
                .send_message(
                    admin.user_id,
                    &format!(
                        "💡 Suggestion from <b>{}</b>:\n{}",
                        teloxide::utils::html::escape(&from),
                        teloxide::utils::html::escape(&text)
                    ),
                    None,
                )
                .await
                .ok();
        }
        inv.transport()
            .send_message(inv.chat_id, "Thanks, passed it on! 🙌", None)
            .await
    }
}

/// The recognized `/admin` sub-actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    AddAdmin,
    RemoveAdmin,
    SetMeetupTime,
    SetSignupTime,
    ForceNextMeetup,
    CancelNextMeetup,
    OverrideNextMeetupTime,
}

impl AdminAction {
    pub const ALL: [AdminAction; 7] = [
        Self::AddAdmin,
        Self::RemoveAdmin,
        Self::SetMeetupTime,
        Self::SetSignupTime,
        Self::ForceNextMeetup,
        Self::CancelNextMeetup,
        Self::OverrideNextMeetupTime,
    ];

    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.token() == token)
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::AddAdmin => "add_admin",
            Self::RemoveAdmin => "remove_admin",
            Self::SetMeetupTime => "set_meetup_time",
            Self::SetSignupTime => "set_signup_time",
            Self::ForceNextMeetup => "force_next_meetup",
            Self::CancelNextMeetup => "cancel_next_meetup",
            Self::OverrideNextMeetupTime => "override_next_meetup_time",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::AddAdmin => "👤 Add admin",
            Self::RemoveAdmin => "❌ Remove admin",
            Self::SetMeetupTime => "🕑 Set meetup time",
            Self::SetSignupTime => "⏰ Set signup time",
            Self::ForceNextMeetup => "💪 Force next meetup",
            Self::CancelNextMeetup => "🚫 Cancel next meetup",
            Self::OverrideNextMeetupTime => "🕑 Override next meetup time",
        }
    }
}

/// `/admin [action]` — admin menu and actions.
pub struct AdminCommand;

const ADMIN_ARGS: &[ArgSpec] = &[ArgSpec::new("action", "Which admin action?")];

#[async_trait]
impl Command for AdminCommand {
    fn aliases(&self) -> &[&'static str] {
        &["/admin"]
    }

    fn help(&self) -> &'static str {
        "opens the admin menu"
    }

    fn args(&self) -> &[ArgSpec] {
        ADMIN_ARGS
    }

    async fn execute(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
        let Some(token) = inv.arg("action") else {
            return self.send_menu(inv).await;
        };
        let Some(action) = AdminAction::parse(token) else {
            return Err(BotError::UnknownSubcommand {
                command: "/admin",
                action: token.to_string(),
            });
        };
        match action {
            AdminAction::AddAdmin => self.add_admin(inv).await,
            AdminAction::RemoveAdmin => self.remove_admin(inv).await,
            AdminAction::SetMeetupTime => {
                self.set_schedule(inv, MEETUP_TIME_KEY, "meetup").await
            }
            AdminAction::SetSignupTime => {
                self.set_schedule(inv, SIGNUP_TIME_KEY, "signup reminder").await
            }
            AdminAction::ForceNextMeetup
            | AdminAction::CancelNextMeetup
            | AdminAction::OverrideNextMeetupTime => Err(BotError::NotImplemented {
                action: action.token().to_string(),
            }),
        }
    }
}

impl AdminCommand {
    async fn send_menu(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
        let admins = inv.db().list_admins()?;
        let admins_str = if admins.is_empty() {
            "none yet".to_string()
        } else {
            admins
                .iter()
                .map(User::display)
                .collect::<Vec<_>>()
                .join(", ")
        };

        let buttons: Vec<QuickReply> = AdminAction::ALL
            .into_iter()
            .map(|a| QuickReply::new(a.label(), format!("/admin {}", a.token())))
            .collect();

        inv.transport()
            .send_keyboard(
                inv.chat_id,
                &format!("Current admins: {admins_str}\n\nAdmin options:"),
                &buttons,
            )
            .await
    }

    async fn add_admin(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
        let answer = inv
            .ask("Enter the Telegram <b>user id</b> of the new admin:")
            .await?;
        let user_id: i64 = answer
            .trim()
            .parse()
            .map_err(|_| BotError::BadNumber { input: answer.clone() })?;

        inv.db().set_admin(user_id, true)?;
        let user = inv
            .db()
            .find_user(user_id)?
            .ok_or(BotError::UserNotFound { user_id })?;

        inv.transport()
            .send_message(
                inv.chat_id,
                &format!("Added <b>{}</b> as an admin.", user.display()),
                None,
            )
            .await
    }

    async fn remove_admin(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
        let admins = inv.db().list_admins()?;
        if admins.is_empty() {
            return inv
                .transport()
                .send_message(inv.chat_id, "There are no admins to remove.", None)
                .await;
        }

        let suggestions: Vec<Suggestion> = admins
            .iter()
            .map(|a| Suggestion::new(a.display(), a.user_id.to_string()))
            .collect();
        let answer = inv
            .ask_with("Select the admin to remove:", &suggestions)
            .await?;
        let user_id: i64 = answer
            .trim()
            .parse()
            .map_err(|_| BotError::BadNumber { input: answer.clone() })?;

        let user = inv
            .db()
            .find_user(user_id)?
            .ok_or(BotError::UserNotFound { user_id })?;

        inv.confirm(&format!(
            "Remove <b>{}</b> from the admin list?",
            user.display()
        ))
        .await?;

        inv.db().set_admin(user_id, false)?;
        inv.transport()
            .send_message(
                inv.chat_id,
                &format!("Removed <b>{}</b> from the admin list.", user.display()),
                None,
            )
            .await
    }

    async fn set_schedule(
        &self,
        inv: &Invocation<'_>,
        key: &str,
        what: &str,
    ) -> Result<(), BotError> {
        let answer = inv
            .ask(&format!(
                "When should the {what} happen?\n\
                 For example <code>friday 18:00</code> or \
                 <code>monday wednesday 20:30, saturday 12:00</code>"
            ))
            .await?;
        let expr = ScheduleExpression::parse(&answer)?;

        // Store the canonical form so later reads parse without surprises.
        inv.db().set_entry(key, &expr.to_string())?;

        inv.transport()
            .send_message(
                inv.chat_id,
                &format!(
                    "Saved: <b>{}</b>\nNext occurrence: <b>{}</b>",
                    expr,
                    format_occurrence(&expr)
                ),
                None,
            )
            .await
    }
}
