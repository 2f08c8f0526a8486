pub(crate) use crate::oauth_utils::OauthTokenResponse;
