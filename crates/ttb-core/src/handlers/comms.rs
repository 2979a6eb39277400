use crate::{
    bot::{Bot, CommandContext},
    commands::EventQuery,
    Result,
};

impl Bot {
    pub(super) async fn handle_weather(&mut self, ctx: &CommandContext, location: &str) -> Result<()> {
        let reply = if location.is_empty() {
            "Usage: w <location> OR /w <location>".to_string()
        } else {
            self.services.weather.weather(location).await
        };
        self.reply(ctx, &reply);
        Ok(())
    }

    pub(super) async fn handle_quote(
        &mut self,
        ctx: &CommandContext,
        lang: &str,
        id: Option<u32>,
    ) -> Result<()> {
        let quotes = &self.services.quotes;
        let reply = match id {
            Some(id) => quotes.quote_by_id(id, lang).await,
            None => quotes.random_quote(lang).await,
        };
        self.reply(ctx, &reply);
        Ok(())
    }

    pub(super) async fn handle_events_query(
        &mut self,
        ctx: &CommandContext,
        country: &str,
        query: &EventQuery,
    ) -> Result<()> {
        let quotes = &self.services.quotes;
        let reply = match query {
            EventQuery::Today => quotes.today_events(country).await,
            EventQuery::Date(date) => quotes.events_by_date(country, date).await,
            EventQuery::Week(date) => quotes.events_by_week(country, date).await,
            EventQuery::Month(month) => quotes.events_by_month(country, month).await,
            EventQuery::Year(year) => quotes.events_by_year(country, year).await,
            EventQuery::Search(q) => quotes.search_events(country, q).await,
        };
        self.reply(ctx, &reply);
        Ok(())
    }

    pub(super) fn handle_channel_text(&mut self, ctx: &CommandContext, text: &str) -> Result<()> {
        if !self.state.in_channel {
            self.send_pm(ctx.sender, "Error: Bot is not in a channel.");
            return Ok(());
        }
        if text.is_empty() {
            self.send_pm(ctx.sender, "Usage: ct <message>");
            return Ok(());
        }

        let sent = self.send_channel(
            self.state.target_channel_id,
            &format!("<{}> {text}", ctx.nickname),
        );
        let reply = if sent {
            "Message sent to channel."
        } else {
            "Failed to send message (check rights/lock status)."
        };
        self.send_pm(ctx.sender, reply);
        Ok(())
    }

    pub(super) fn handle_broadcast(&mut self, ctx: &CommandContext, text: &str) -> Result<()> {
        let reply = if self.send_broadcast(text) {
            "Broadcast sent."
        } else {
            "Failed to send broadcast (check rights/lock status)."
        };
        self.send_pm(ctx.sender, reply);
        Ok(())
    }
}
