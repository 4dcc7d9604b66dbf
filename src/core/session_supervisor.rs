//! 会话监管：代次（generation）与取消令牌
//!
//! 每次开始新任务都会进入新的代次，并取消上一代次的令牌；同一代次内同时只允许一个轮询，
//! 新轮询会先取消旧轮询的子令牌。

use tokio_util::sync::CancellationToken;

/// 代次编号：用于丢弃来自已被取代的轮询的迟到更新
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// 一次轮询的登记凭证
#[derive(Clone, Debug)]
pub struct PollTicket {
    pub id: u64,
    pub generation: Generation,
    pub token: CancellationToken,
}

/// 会话级取消令牌管理
#[derive(Debug)]
pub struct SessionSupervisor {
    generation: Generation,
    /// 当前代次的令牌，换代或 reset 时取消
    generation_token: CancellationToken,
    /// 当前活跃轮询（令牌为 generation_token 的子令牌）
    active_poll: Option<(u64, CancellationToken)>,
    next_poll_id: u64,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            generation: Generation::default(),
            generation_token: CancellationToken::new(),
            active_poll: None,
            next_poll_id: 0,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// 进入新代次：取消旧代次下所有轮询
    pub fn advance(&mut self) -> Generation {
        self.generation_token.cancel();
        self.generation_token = CancellationToken::new();
        self.active_poll = None;
        self.generation = Generation(self.generation.0 + 1);
        self.generation
    }

    /// 为当前代次登记一个新轮询，先取消已有的轮询
    pub fn begin_poll(&mut self) -> PollTicket {
        self.cancel_poll();
        self.next_poll_id += 1;
        let token = self.generation_token.child_token();
        self.active_poll = Some((self.next_poll_id, token.clone()));
        PollTicket {
            id: self.next_poll_id,
            generation: self.generation,
            token,
        }
    }

    /// 轮询结束后清除登记（仅当登记的仍是这一次轮询）
    pub fn finish_poll(&mut self, ticket: &PollTicket) {
        if matches!(self.active_poll, Some((id, _)) if id == ticket.id) {
            self.active_poll = None;
        }
    }

    pub fn has_active_poll(&self) -> bool {
        self.active_poll
            .as_ref()
            .map(|(_, t)| !t.is_cancelled())
            .unwrap_or(false)
    }

    /// 取消当前轮询但不换代
    pub fn cancel_poll(&mut self) {
        if let Some((_, token)) = self.active_poll.take() {
            token.cancel();
        }
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
