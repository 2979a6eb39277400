use crate::{
    bot::{Bot, CommandContext},
    Result,
};

impl Bot {
    pub(super) fn handle_poll_create(&mut self, ctx: &CommandContext, args: &str) -> Result<()> {
        let (poll_id, announcement) = match self.polls.create(args) {
            Ok(poll) => (poll.id, poll.announcement()),
            Err(e) => {
                self.send_pm(ctx.sender, &e.to_string());
                return Ok(());
            }
        };
        tracing::info!(poll_id, creator = %ctx.nickname, "poll created");

        if self.state.in_channel {
            self.send_channel(self.state.target_channel_id, &announcement);
            self.send_pm(ctx.sender, &format!("Poll #{poll_id} created in channel."));
        } else {
            self.send_pm(ctx.sender, &announcement);
        }
        Ok(())
    }

    pub(super) fn handle_vote(&mut self, ctx: &CommandContext, poll_id: u32, choice: usize) -> Result<()> {
        let reply = match self.polls.vote(poll_id, ctx.sender, choice) {
            Ok(option) => format!("Vote for '{option}' in Poll #{poll_id} recorded."),
            Err(e) => e.to_string(),
        };
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }

    pub(super) fn handle_results(&mut self, ctx: &CommandContext, poll_id: Option<u32>) -> Result<()> {
        let reply = match poll_id {
            None => {
                let ids = self.polls.ids();
                let active = if ids.is_empty() {
                    "None".to_string()
                } else {
                    ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
                };
                format!("Active Polls: {active}. Usage: results <poll_id>")
            }
            Some(id) => match self.polls.get(id) {
                Ok(poll) => poll.results_text(),
                Err(e) => e.to_string(),
            },
        };
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }
}
