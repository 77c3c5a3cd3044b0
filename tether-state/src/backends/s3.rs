//! S3 backend configuration
//!
//! Locates a Terraform state object in an S3 bucket. Only `bucket` and
//! `key` are required; everything else falls back to the provider's
//! ambient AWS configuration (environment, shared config files, instance
//! metadata) when left unset.

use crate::backend::define_backend;

define_backend! {
    /// Configuration for a state stored in S3
    S3Backend, S3BackendBuilder, "s3";
    required {
        /// Name of the bucket holding the state
        bucket: String => "bucket",
        /// Object key of the state within the bucket
        key: String => "key",
    }
    optional {
        /// AWS region of the bucket
        region: String => "region",
        /// Custom S3 endpoint
        endpoint: String => "endpoint",
        /// AWS access key
        access_key: String => "accessKey",
        /// AWS secret key
        secret_key: String => "secretKey",
        /// Named profile from the shared credentials file
        profile: String => "profile",
        /// Path to the shared credentials file
        shared_credentials_file: String => "sharedCredentialsFile",
        /// Session token for temporary credentials
        token: String => "token",
        /// ARN of the role to assume
        role_arn: String => "roleArn",
        /// External ID used when assuming the role
        external_id: String => "externalId",
        /// Session name used when assuming the role
        session_name: String => "sessionName",
        /// Prefix for non-default workspace state keys
        workspace_key_prefix: String => "workspaceKeyPrefix",
        /// Custom IAM endpoint
        iam_endpoint: String => "iamEndpoint",
        /// Custom STS endpoint
        sts_endpoint: String => "stsEndpoint",
        /// Skip credential validation via STS
        skip_credentials_validation: bool => "skipCredentialsValidation",
        /// Skip validation of the region name
        skip_region_validation: bool => "skipRegionValidation",
        /// Skip the EC2 metadata API check
        skip_metadata_api_check: bool => "skipMetadataApiCheck",
        /// Use path-style addressing for S3 requests
        force_path_style: bool => "forcePathStyle",
        /// Workspace whose state is read
        workspace: String => "workspace",
    }
    secret { access_key, secret_key, token }
}
