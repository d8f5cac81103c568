//! Prompt text sent to the generation model by the orchestrator.

pub fn news_extraction_prompt(utterance: &str) -> String {
    format!(
        "Extract the country and category for news from the following request.\n\
         Respond only in JSON with two fields: \"country\" and \"category\".\n\n\
         User Request: {utterance}"
    )
}

pub fn news_summary_prompt(country: &str, category: &str, headlines: &str) -> String {
    format!(
        "The user asked for news in country: {} and category: {category}. \
         Here are the top headlines:\n\n{headlines}\n\nPlease summarize them.",
        country.to_uppercase()
    )
}

pub fn decompose_plan_prompt(context: &str) -> String {
    format!(
        "Break the user's latest request into a short numbered list of subtasks \
         needed to answer it. Respond with the list only.\n\n\
         Conversation:\n{context}"
    )
}

pub fn decompose_execute_prompt(context: &str, plan: &str) -> String {
    format!(
        "Work through these subtasks in order, then give the final answer to the \
         user's latest request. Reply with the final answer only.\n\n\
         Subtasks:\n{plan}\n\nConversation:\n{context}"
    )
}
