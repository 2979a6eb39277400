use crate::{
    bot::{Bot, CommandContext},
    history::{channel_user_key, pm_key, HistoryEntry},
    session::Feature,
    Result,
};

impl Bot {
    /// Conversation context for an AI request, empty when context history is
    /// switched off.
    fn ai_context(&self, key: &str) -> Vec<HistoryEntry> {
        if self.state.toggles.context_history_enabled {
            self.history.get(key)
        } else {
            Vec::new()
        }
    }

    pub(super) async fn handle_pm_ai(&mut self, ctx: &CommandContext, prompt: &str) -> Result<()> {
        if !self.state.toggles.allow_ai_pm {
            self.send_pm(ctx.sender, "[Bot] Gemini AI (PM) is disabled.");
            return Ok(());
        }
        if !self.services.ai.is_enabled() {
            self.send_pm(ctx.sender, "[Bot Error] Gemini AI is not available.");
            return Ok(());
        }
        if prompt.is_empty() {
            self.send_pm(ctx.sender, "Usage: c <your question>");
            return Ok(());
        }

        let mut context = self.ai_context(&pm_key(ctx.sender));
        // The triggering line is already recorded; the prompt carries it.
        if let Some(pos) = context.iter().rposition(|e| !e.is_bot && e.text == ctx.text) {
            context.remove(pos);
        }
        self.send_pm(ctx.sender, "[Bot] Asking Gemini...");
        tracing::debug!(user_id = ctx.sender.0, context_len = context.len(), "asking AI via PM");
        let reply = self.services.ai.generate(prompt, &context).await;
        self.send_pm(ctx.sender, &reply);
        Ok(())
    }

    pub(super) async fn handle_channel_ai(
        &mut self,
        ctx: &CommandContext,
        prompt: &str,
    ) -> Result<()> {
        if !self.state.toggles.allow_ai_channel {
            return Ok(());
        }
        if !self.services.ai.is_enabled() {
            self.send_channel(ctx.channel_id, "[Bot Error] Gemini AI is not available.");
            return Ok(());
        }
        if prompt.is_empty() {
            self.send_channel(ctx.channel_id, "Usage: /c <your question>");
            return Ok(());
        }

        let key = channel_user_key(ctx.channel_id, ctx.sender);
        let context = self.ai_context(&key);
        self.history.add(&key, prompt, &ctx.nickname, false);

        self.send_channel(
            ctx.channel_id,
            &format!("[Bot] Asking Gemini for {}...", ctx.nickname),
        );
        let reply = self.services.ai.generate(prompt, &context).await;
        self.history.add(&key, &reply, &self.state.nickname, true);
        self.send_channel(
            ctx.channel_id,
            &format!("Answering {}: {reply}", ctx.nickname),
        );
        Ok(())
    }

    pub(super) fn handle_instruct(&mut self, ctx: &CommandContext, text: &str) -> Result<()> {
        if text.is_empty() {
            self.reply(ctx, "Usage: instruct <your system instructions here>");
            return Ok(());
        }
        self.services.ai.set_system_instructions(text);
        self.settings.bot.ai_system_instructions = text.to_string();
        self.persist();
        tracing::info!(admin = %ctx.nickname, "AI system instructions updated");
        self.reply(ctx, "AI system instructions have been updated and saved.");
        Ok(())
    }

    pub(super) fn handle_set_welcome_instruction(
        &mut self,
        ctx: &CommandContext,
        text: &str,
    ) -> Result<()> {
        self.services.ai.set_welcome_instructions(text);
        self.settings.bot.welcome_message_instructions = text.to_string();
        self.persist();
        self.send_pm(ctx.sender, "Welcome message instructions updated.");
        Ok(())
    }

    pub(super) async fn handle_gemini_key(&mut self, ctx: &CommandContext, key: &str) -> Result<()> {
        let ok = self.services.ai.set_api_key(key).await;
        self.state.set(Feature::AiPm, ok);
        self.state.set(Feature::AiChannel, ok);

        let reply = if ok {
            self.settings.bot.gemini_api_key = key.to_string();
            self.persist();
            "Gemini API key updated and initialized successfully."
        } else {
            tracing::warn!(admin = %ctx.nickname, "rejected Gemini API key");
            "Gemini API key provided is invalid or failed to initialize model. Key not saved."
        };
        self.send_pm(ctx.sender, reply);
        Ok(())
    }

    pub(super) async fn handle_list_models(&mut self, ctx: &CommandContext) -> Result<()> {
        if !self.services.ai.is_enabled() {
            self.send_pm(ctx.sender, "Gemini service is not enabled. Cannot list models.");
            return Ok(());
        }
        let models = self.services.ai.list_models().await;
        if models.is_empty() {
            self.send_pm(ctx.sender, "No Gemini models found or failed to retrieve list.");
        } else {
            self.send_pm(
                ctx.sender,
                &format!("Available Gemini Models:\n{}", models.join("\n")),
            );
        }
        Ok(())
    }

    pub(super) async fn handle_set_model(&mut self, ctx: &CommandContext, name: &str) -> Result<()> {
        if self.services.ai.set_model(name).await {
            self.settings.bot.gemini_model_name = self.services.ai.current_model();
            self.persist();
            self.send_pm(
                ctx.sender,
                &format!("Gemini model set to '{name}' successfully."),
            );
        } else {
            self.send_pm(
                ctx.sender,
                &format!("Failed to set Gemini model to '{name}'. Check model name and API key."),
            );
        }
        Ok(())
    }
}
