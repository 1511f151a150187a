//! 内置模板正文

pub const SYSTEM_FORMAT_LAST: &str = r#"Reply only in the following JSON format:
{
  "thoughts": {
    "text": "thoughts",
    "reasoning": "reasoning behind thoughts",
    "plan": "- short bulleted\n- list that conveys\n- long-term plan",
    "criticism": "constructive self-criticism",
    "speak": "thoughts summary to say to user",
    "last_step": true if this step completes the task, otherwise false
  },
  "ability": {
    "name": "ability name",
    "args": {
      "arg name": "value"
    }
  }
}

Choose exactly one ability per reply. Do not write anything outside of the JSON object.
The reply must validate against this JSON schema:
{schema}"#;

pub const ONTOLOGY_FORMAT: &str = r#"You are {name}, an expert in {expertise}.
Your role: {role}

Your task is:
{task}

Answer in the provided format.

You have access to the following abilities, call them by name with keyword arguments:
{abilities}"#;

pub const TASK_FORMAT: &str = r#"You are a {role_expert}.

Your task is:
{task}

Answer in the provided format."#;

pub const PAST_CONVO: &str = r#"Here is a previous related exchange, use it as background only:
{document}"#;

pub const PROFILE_FORMAT: &str = r#"Based on the following task description, identify the most suitable type of expert who would excel at completing it.
The task is: '{task}'

Reply with a JSON object {"name": "...", "expertise": "...", "role": "..."} or with only the expert type name, without any additional text."#;
