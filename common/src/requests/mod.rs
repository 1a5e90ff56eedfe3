use serde::Deserialize;

#[derive(Deserialize)]
/// Request payload for the path-based import endpoints.
/// `filename` is a bare file name resolved inside the configured import directory.
pub struct ImportFileRequest {
    pub filename: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
/// Request payload for resolving an unmatched booking to a member.
pub struct ResolveUnmatchedRequest {
    pub member_email: String,
}

#[derive(Deserialize, Default)]
/// Query string of the unmatched listing. `resolved` absent lists both states.
pub struct UnmatchedQuery {
    pub resolved: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
