//! Prompt builders for the reasoning loop.

/// System prompt for the agent phase.
///
/// Mentions the environment only when one is bound so the model does
/// not attempt file operations on informational runs.
pub fn agent_system_prompt(environment_url: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a coding agent working on the user's request. \
         Think step by step, use the available tools when they help, \
         and finish with a clear textual answer.",
    );
    match environment_url {
        Some(url) => {
            prompt.push_str(
                "\n\nYou have a sandboxed execution environment. File and \
                 command tools operate inside it. The environment is \
                 reachable at: ",
            );
            prompt.push_str(url);
        }
        None => {
            prompt.push_str(
                "\n\nNo execution environment is bound to this run. Answer \
                 from knowledge and the reference and memory tools only.",
            );
        }
    }
    prompt
}

/// System prompt for the audit phase. The model must answer exactly
/// PASS or RETRY.
pub fn auditor_system_prompt() -> String {
    String::from(
        "You are a strict quality auditor. Given the assistant's answer to \
         a user request, reply with exactly one word: PASS if the answer \
         addresses the request, or RETRY if it is incomplete, evasive, or \
         wrong. Reply with nothing but PASS or RETRY.",
    )
}

/// User-side content for one audit call.
pub fn auditor_review_request(user_prompt: &str, assistant_answer: &str) -> String {
    format!("User request:\n{user_prompt}\n\nAssistant answer:\n{assistant_answer}")
}

/// Feedback appended to the conversation when an audit returns RETRY.
pub fn retry_feedback() -> String {
    String::from(
        "Your previous answer did not fully address the request. \
         Revise it: fill the gaps and answer completely.",
    )
}
